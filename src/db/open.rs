use log::info;
use rusqlite::Connection;

use crate::WorkingDirectory;

/// included database schema
static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));

pub fn open_db(wd: &WorkingDirectory) -> rusqlite::Result<Connection> {
    let path = &wd.path.join("settings.db");
    if !path.exists() { info!("Creating new database {}", path.display()) }
    let conn = Connection::open(path)?;
    conn.execute(SCHEMA, [])?;
    Ok(conn)
}

/// Throwaway database, nothing survives the connection
pub fn open_memory_db() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute(SCHEMA, [])?;
    Ok(conn)
}
