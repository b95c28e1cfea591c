use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Wall clock limit of a job, in any of the formats sbatch's `--time` accepts
///
/// Accepted: `M`, `M:S`, `H:M:S`, `D-H`, `D-H:M` and `D-H:M:S`. Zero is rejected because sbatch
/// would read it as "no limit". Displays as `HH:MM:SS`, or `D-HH:MM:SS` from one day on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeLimit {
    seconds: u64,
}

impl TimeLimit {
    pub fn from_duration(duration: Duration) -> Result<TimeLimit, ConfigurationError> {
        match duration.as_secs() {
            0 => Err(invalid("time limit must be positive")),
            seconds => Ok(TimeLimit { seconds }),
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

fn invalid(reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: "timeLimit".to_string(),
        reason: reason.to_string(),
    }
}

fn component(text: &str) -> Result<u64, ConfigurationError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(&format!("{text:?} is not a number")));
    }
    text.parse::<u32>()
        .map(u64::from)
        .map_err(|_| invalid(&format!("{text} is too large")))
}

fn sexagesimal(value: u64, unit: &str) -> Result<u64, ConfigurationError> {
    match value < 60 {
        true => Ok(value),
        false => Err(invalid(&format!("{unit} must be below 60, got {value}"))),
    }
}

impl FromStr for TimeLimit {
    type Err = ConfigurationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("time limit is empty"));
        }

        let (days, clock) = match text.split_once('-') {
            Some((days, clock)) => (Some(component(days)?), clock),
            None => (None, text),
        };
        let parts = clock
            .split(':')
            .map(component)
            .collect::<Result<Vec<u64>, ConfigurationError>>()?;

        let seconds = match (days, parts.as_slice()) {
            (None, [m]) => m * 60,
            (None, [m, s]) => m * 60 + sexagesimal(*s, "seconds")?,
            (None, [h, m, s]) => {
                h * 3600 + sexagesimal(*m, "minutes")? * 60 + sexagesimal(*s, "seconds")?
            }
            (Some(d), [h]) => d * 86400 + h * 3600,
            (Some(d), [h, m]) => d * 86400 + h * 3600 + sexagesimal(*m, "minutes")? * 60,
            (Some(d), [h, m, s]) => {
                d * 86400 + h * 3600 + sexagesimal(*m, "minutes")? * 60 + sexagesimal(*s, "seconds")?
            }
            _ => return Err(invalid(&format!("{text:?} is not a SLURM time limit"))),
        };

        TimeLimit::from_duration(Duration::from_secs(seconds))
    }
}

impl TryFrom<String> for TimeLimit {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeLimit> for String {
    fn from(value: TimeLimit) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let days = self.seconds / 86400;
        let hours = self.seconds % 86400 / 3600;
        let minutes = self.seconds % 3600 / 60;
        let seconds = self.seconds % 60;
        match days {
            0 => write!(f, "{hours:02}:{minutes:02}:{seconds:02}"),
            _ => write!(f, "{days}-{hours:02}:{minutes:02}:{seconds:02}"),
        }
    }
}
