use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;
use crate::job::TimeLimit;
use crate::settings::ConfigStore;

/// Everything needed to render a ParaView job script
///
/// Built from the settings store (user values over schema defaults). Field names on the store
/// side are the camelCase keys of the settings schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub account: String,
    #[serde(rename = "name")]
    pub job_name: String,
    pub nodes: NonZeroU32,
    pub time_limit: TimeLimit,
    pub partition: String,
    pub displays: u32,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub auth_key_file: Option<PathBuf>,
}

impl JobConfiguration {
    /// Settings keys read by [JobConfiguration::load]
    pub const KEYS: [&'static str; 9] = [
        "account",
        "name",
        "nodes",
        "timeLimit",
        "partition",
        "displays",
        "stdout",
        "stderr",
        "authKeyFile",
    ];

    pub fn load(store: &impl ConfigStore) -> Result<JobConfiguration, ConfigurationError> {
        let mut document = Map::new();
        for key in Self::KEYS {
            document.insert(key.to_string(), store.get(key).unwrap_or(Value::Null));
        }
        let mut config: JobConfiguration = serde_json::from_value(Value::Object(document))
            .map_err(|err| ConfigurationError::Invalid(vec![err.to_string()]))?;
        // a cleared form field is stored as ""
        for path in [&mut config.stdout, &mut config.stderr, &mut config.auth_key_file] {
            if path.as_deref().is_some_and(is_blank) {
                *path = None;
            }
        }
        Ok(config)
    }

    /// Write every field back to the store
    pub fn store(&self, store: &mut impl ConfigStore) -> Result<(), ConfigurationError> {
        let document = serde_json::to_value(self)
            .map_err(|err| ConfigurationError::Invalid(vec![err.to_string()]))?;
        if let Value::Object(fields) = document {
            for (key, value) in fields {
                store.set(&key, value)?;
            }
        }
        Ok(())
    }

    /// Explicit stdout path, or `<job name>-%j.out`
    pub fn stdout_path(&self) -> PathBuf {
        self.stdout
            .clone()
            .filter(|path| !is_blank(path))
            .unwrap_or_else(|| PathBuf::from(format!("{}-%j.out", self.job_name)))
    }

    /// Explicit stderr path, or `<job name>-%j.err`
    pub fn stderr_path(&self) -> PathBuf {
        self.stderr
            .clone()
            .filter(|path| !is_blank(path))
            .unwrap_or_else(|| PathBuf::from(format!("{}-%j.err", self.job_name)))
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}
