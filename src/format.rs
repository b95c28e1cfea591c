use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

/// How command results are printed
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl OutputFormat {
    /// Text goes through `text`, JSON through serde
    pub fn render<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> serde_json::Result<String> {
        match self {
            OutputFormat::Text => Ok(text(value)),
            OutputFormat::Json => serde_json::to_string_pretty(value),
        }
    }
}
