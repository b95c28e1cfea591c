//! User settings: a JSON schema declaring every job parameter, and a store holding the values
//!
//! The store is passed explicitly to whoever needs it (see [ConfigStore]), there's no global
//! settings state.

pub mod poll;
pub mod registry;
pub mod schema;

use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigurationError;

pub use poll::PollSettings;
pub use registry::SettingsRegistry;
pub use schema::SettingsSchema;

/// Called after a setting changed
pub type ChangeListener = Box<dyn Fn(&SettingsChange) + Send>;

#[derive(Clone, Debug, PartialEq)]
pub struct SettingsChange {
    pub key: String,
    pub old: Value,
    pub new: Value,
}

/// One entry of the settings form
#[derive(Clone, Debug, Serialize)]
pub struct SettingField {
    pub key: String,
    pub title: String,
    pub description: String,
    pub default: Value,
    pub value: Value,
}

/// Key/value settings with schema defaults
pub trait ConfigStore {
    /// Current value of a setting, falling back to its default. None for unknown keys.
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigurationError>;

    fn on_change(&mut self, listener: ChangeListener);

    /// Every setting in schema order, for display
    fn fields(&self) -> Vec<SettingField>;
}
