use std::time::Duration;

use serde_json::Value;

use crate::error::ConfigurationError;
use crate::settings::ConfigStore;

/// How often a submitted job is polled, and for how long its server is looked for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub connection_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings { interval: Duration::from_secs(5), connection_attempts: 60 }
    }
}

impl PollSettings {
    pub fn load(store: &impl ConfigStore) -> Result<PollSettings, ConfigurationError> {
        let defaults = PollSettings::default();
        let interval = match store.get("pollInterval") {
            None | Some(Value::Null) => defaults.interval,
            Some(value) => Duration::from_secs(positive("pollInterval", &value)?),
        };
        let connection_attempts = match store.get("connectionAttempts") {
            None | Some(Value::Null) => defaults.connection_attempts,
            Some(value) => u32::try_from(positive("connectionAttempts", &value)?).map_err(|_| {
                ConfigurationError::InvalidValue {
                    key: "connectionAttempts".to_string(),
                    reason: "too large".to_string(),
                }
            })?,
        };
        Ok(PollSettings { interval, connection_attempts })
    }
}

fn positive(key: &str, value: &Value) -> Result<u64, ConfigurationError> {
    match value.as_u64() {
        Some(number) if number > 0 => Ok(number),
        _ => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            reason: format!("{value} is not a positive integer"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::open::open_memory_db;
    use crate::settings::{SettingsRegistry, SettingsSchema};

    #[test]
    fn reads_poll_settings_from_the_store() {
        let mut registry =
            SettingsRegistry::open(open_memory_db().unwrap(), SettingsSchema::embedded().unwrap()).unwrap();
        assert_eq!(PollSettings::load(&registry).unwrap(), PollSettings::default());

        registry.set("pollInterval", json!(2)).unwrap();
        registry.set("connectionAttempts", json!(3)).unwrap();
        let settings = PollSettings::load(&registry).unwrap();
        assert_eq!(settings.interval, Duration::from_secs(2));
        assert_eq!(settings.connection_attempts, 3);
    }
}
