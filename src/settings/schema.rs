use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use log::info;
use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// JSON schema declaring each setting, its type, default and description
pub struct SettingsSchema {
    properties: Map<String, Value>,
    compiled: JSONSchema,
}

impl SettingsSchema {
    /// The schema shipped with the launcher
    pub fn embedded() -> Result<SettingsSchema, ConfigurationError> {
        /// included settings schema
        static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/settings.json"));
        let document = serde_json::from_str(SCHEMA).map_err(|err| ConfigurationError::Schema(err.to_string()))?;
        SettingsSchema::compile(document)
    }

    pub fn from_path(path: &Path) -> Result<SettingsSchema, ConfigurationError> {
        info!("Reading settings schema {}", path.display());
        let json_string = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let document = serde_json::from_str(&json_string).map_err(|err| ConfigurationError::Schema(err.to_string()))?;
        SettingsSchema::compile(document)
    }

    fn compile(document: Value) -> Result<SettingsSchema, ConfigurationError> {
        let properties = match document.get("properties") {
            Some(Value::Object(properties)) => properties.clone(),
            _ => return Err(ConfigurationError::Schema("schema has no properties".to_string())),
        };
        let compiled = JSONSchema::options()
            .compile(&document)
            .map_err(|err| ConfigurationError::Schema(err.to_string()))?;
        Ok(SettingsSchema { properties, compiled })
    }

    fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties().contains_key(key)
    }

    /// Setting keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties().keys().map(String::as_str)
    }

    /// Declared default, null when the schema has none
    pub fn default(&self, key: &str) -> Option<Value> {
        self.properties()
            .get(key)
            .map(|property| property.get("default").cloned().unwrap_or(Value::Null))
    }

    pub fn title(&self, key: &str) -> String {
        self.annotation(key, "title").unwrap_or_else(|| key.to_string())
    }

    pub fn description(&self, key: &str) -> String {
        self.annotation(key, "description").unwrap_or_default()
    }

    fn annotation(&self, key: &str, name: &str) -> Option<String> {
        self.properties()
            .get(key)
            .and_then(|property| property.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn validate(&self, document: &Value) -> Result<(), ConfigurationError> {
        self.compiled.validate(document).map_err(|errors| {
            let messages = errors
                .map(|err| match err.instance_path.to_string().as_str() {
                    "" => err.to_string(),
                    path => format!("{path}: {err}"),
                })
                .collect();
            ConfigurationError::Invalid(messages)
        })
    }
}
