//! User settings are stored in a SQLite database

/// Connect to a SQLite database
pub mod open;
/// Load, save and delete settings rows
pub mod settings;
