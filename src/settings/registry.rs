use log::{info, warn};
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::db::settings::{delete_setting, load_settings, save_setting};
use crate::error::ConfigurationError;
use crate::settings::{ChangeListener, ConfigStore, SettingField, SettingsChange, SettingsSchema};

/// Settings persisted in SQLite and validated against a schema
///
/// Only values the user set are stored, everything else comes from the schema defaults. A write
/// is validated against the whole settings document before it reaches the database.
pub struct SettingsRegistry {
    conn: Connection,
    schema: SettingsSchema,
    values: Map<String, Value>,
    listeners: Vec<ChangeListener>,
}

impl SettingsRegistry {
    pub fn open(conn: Connection, schema: SettingsSchema) -> Result<SettingsRegistry, ConfigurationError> {
        let mut values = load_settings(&conn)?;
        values.retain(|key, _| match schema.contains(key) {
            true => true,
            false => {
                warn!("Ignoring stored setting {key}, it's not in the schema");
                false
            }
        });
        info!("Loaded {} user settings", values.len());

        let registry = SettingsRegistry { conn, schema, values, listeners: Vec::new() };
        if let Err(err) = registry.schema.validate(&registry.document()) {
            warn!("Stored settings don't match the schema: {err}");
        }
        Ok(registry)
    }

    /// Defaults overlaid with user values
    pub fn document(&self) -> Value {
        let document: Map<String, Value> = self
            .schema
            .keys()
            .map(|key| (key.to_string(), self.get(key).unwrap_or(Value::Null)))
            .collect();
        Value::Object(document)
    }

    /// Drop the user value, the setting goes back to its default
    pub fn reset(&mut self, key: &str) -> Result<(), ConfigurationError> {
        let old = self.get(key).ok_or_else(|| ConfigurationError::UnknownKey(key.to_string()))?;
        if self.values.remove(key).is_none() {
            return Ok(());
        }
        delete_setting(&self.conn, key)?;
        let new = self.get(key).unwrap_or(Value::Null);
        self.notify(key, old, new);
        Ok(())
    }

    fn notify(&self, key: &str, old: Value, new: Value) {
        if old == new {
            return;
        }
        let change = SettingsChange { key: key.to_string(), old, new };
        for listener in &self.listeners {
            listener(&change);
        }
    }
}

impl ConfigStore for SettingsRegistry {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.get(key) {
            Some(value) => Some(value.clone()),
            None => self.schema.default(key),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigurationError> {
        if !self.schema.contains(key) {
            return Err(ConfigurationError::UnknownKey(key.to_string()));
        }

        let mut document = self.document();
        document[key] = value.clone();
        self.schema.validate(&document)?;

        let old = self.get(key).unwrap_or(Value::Null);
        save_setting(&self.conn, key, &value)?;
        self.values.insert(key.to_string(), value.clone());
        self.notify(key, old, value);
        Ok(())
    }

    fn on_change(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    fn fields(&self) -> Vec<SettingField> {
        self.schema
            .keys()
            .map(|key| SettingField {
                key: key.to_string(),
                title: self.schema.title(key),
                description: self.schema.description(key),
                default: self.schema.default(key).unwrap_or(Value::Null),
                value: self.get(key).unwrap_or(Value::Null),
            })
            .collect()
    }
}
