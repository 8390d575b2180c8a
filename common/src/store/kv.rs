//! Flat string-to-JSON process state sidecar, ported field-for-field from
//! the reference `queries/kv.py`: values are JSON-encoded on write and
//! decoded on read, `REPLACE INTO` gives upsert semantics.

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;

pub fn set(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    conn.execute(
        "REPLACE INTO keyValueStore (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, encoded],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let encoded: Option<String> = conn
        .query_row("SELECT value FROM keyValueStore WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    encoded.map(|s| Ok(serde_json::from_str(&s)?)).transpose()
}

pub fn del(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM keyValueStore WHERE key = ?1", [key])?;
    Ok(())
}

/// Ordered by key name; `prefix = ""` returns everything, matching the
/// reference `get_all` as a thin wrapper over `get_prefix`.
pub fn get_prefix(conn: &Connection, prefix: &str) -> Result<Vec<(String, Value)>> {
    let like_pattern = format!("{}%", escape_like(prefix));
    let mut stmt = conn.prepare(
        "SELECT key, value FROM keyValueStore WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key",
    )?;
    let rows = stmt.query_map([like_pattern], |row| {
        let key: String = row.get(0)?;
        let value: String = row.get(1)?;
        Ok((key, value))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (key, value) = row?;
        out.push((key, serde_json::from_str(&value)?));
    }
    Ok(out)
}

pub fn get_all(conn: &Connection) -> Result<Vec<(String, Value)>> {
    get_prefix(conn, "")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(crate::store::schema::DDL).unwrap();
        conn
    }

    #[test]
    fn round_trip_preserves_value() {
        let conn = open();
        set(&conn, "capture/interface", &json!("wlan0mon")).unwrap();
        assert_eq!(get(&conn, "capture/interface").unwrap(), Some(json!("wlan0mon")));
    }

    #[test]
    fn missing_key_is_none() {
        let conn = open();
        assert_eq!(get(&conn, "nope").unwrap(), None);
    }

    #[test]
    fn get_prefix_filters_and_orders_by_key() {
        let conn = open();
        set(&conn, "capture/b", &json!(2)).unwrap();
        set(&conn, "capture/a", &json!(1)).unwrap();
        set(&conn, "upload/a", &json!(3)).unwrap();
        let results = get_prefix(&conn, "capture/").unwrap();
        assert_eq!(results, vec![("capture/a".to_string(), json!(1)), ("capture/b".to_string(), json!(2))]);
    }

    #[test]
    fn get_all_returns_every_key() {
        let conn = open();
        set(&conn, "a", &json!(1)).unwrap();
        set(&conn, "z", &json!(2)).unwrap();
        assert_eq!(get_all(&conn).unwrap().len(), 2);
    }

    #[test]
    fn del_removes_key() {
        let conn = open();
        set(&conn, "a", &json!(1)).unwrap();
        del(&conn, "a").unwrap();
        assert_eq!(get(&conn, "a").unwrap(), None);
    }
}
