use log::{info, warn};
use rusqlite::Connection;
use serde_json::{Map, Value};

/// Every stored setting
///
/// Values are stored as JSON text. Rows that aren't valid JSON are skipped with a warning.
pub fn load_settings(conn: &Connection) -> rusqlite::Result<Map<String, Value>> {
    let mut stmt = conn.prepare("SELECT key, value FROM setting ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut settings = Map::new();
    for row in rows {
        let (key, json_string) = row?;
        match serde_json::from_str::<Value>(&json_string) {
            Ok(value) => {
                info!("Loading setting {key} from db");
                settings.insert(key, value);
            }
            Err(err) => warn!("Ignoring setting {key}, stored value isn't JSON: {err}"),
        }
    }
    Ok(settings)
}

pub fn save_setting(conn: &Connection, key: &str, value: &Value) -> rusqlite::Result<()> {
    info!("Updating setting {key}");
    conn.execute(
        "INSERT INTO setting (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated = CURRENT_TIMESTAMP",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn delete_setting(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    info!("Deleting setting {key}");
    conn.execute("DELETE FROM setting WHERE key = ?1", [key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::open::open_memory_db;

    #[test]
    fn settings_rows_round_trip() {
        let conn = open_memory_db().unwrap();
        save_setting(&conn, "nodes", &json!(4)).unwrap();
        save_setting(&conn, "account", &json!("abc")).unwrap();
        save_setting(&conn, "nodes", &json!(2)).unwrap();

        let settings = load_settings(&conn).unwrap();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings["nodes"], json!(2));

        delete_setting(&conn, "nodes").unwrap();
        assert!(!load_settings(&conn).unwrap().contains_key("nodes"));
    }

    #[test]
    fn rows_that_are_not_json_are_skipped() {
        let conn = open_memory_db().unwrap();
        conn.execute("INSERT INTO setting (key, value) VALUES ('account', 'abc')", []).unwrap();
        assert!(load_settings(&conn).unwrap().is_empty());
    }
}
