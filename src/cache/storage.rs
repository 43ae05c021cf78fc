//! SQLite-backed key-value store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::KeyValueStore;

/// Key-value store in a single SQLite table.
///
/// Each mutation is one statement, so unlike [`DiskStore`](super::DiskStore)
/// the cost of a write does not grow with the size of the table.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    let conn = self.conn()?;

    let raw: Option<String> = conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))?;

    raw
      .map(|data| {
        serde_json::from_str(&data).map_err(|e| eyre!("Failed to deserialize {}: {}", key, e))
      })
      .transpose()
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    let conn = self.conn()?;
    let data = serde_json::to_string(&value).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store key {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<bool> {
    let conn = self.conn()?;

    let removed = conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete key {}: {}", key, e))?;

    Ok(removed > 0)
  }

  fn delete_prefix(&self, prefix: &str) -> Result<usize> {
    let conn = self.conn()?;

    // substr avoids LIKE wildcard escaping for prefixes containing % or _
    let removed = conn
      .execute(
        "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
      )
      .map_err(|e| eyre!("Failed to delete prefix {}: {}", prefix, e))?;

    Ok(removed)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;

    let mut stmt = conn
      .prepare("SELECT key FROM kv ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }

  fn flush(&self) -> Result<()> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_set_get_delete() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("a", json!({"n": 1})).unwrap();
    store.set("a", json!({"n": 2})).unwrap();

    assert_eq!(store.get("a").unwrap(), Some(json!({"n": 2})));
    assert!(store.delete("a").unwrap());
    assert_eq!(store.get("a").unwrap(), None);
  }

  #[test]
  fn test_delete_prefix_treats_wildcards_literally() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("a_b:1", json!(1)).unwrap();
    store.set("axb:1", json!(2)).unwrap();

    assert_eq!(store.delete_prefix("a_b:").unwrap(), 1);
    assert_eq!(store.keys().unwrap(), vec!["axb:1".to_string()]);
  }

  #[test]
  fn test_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    SqliteStore::open(&path).unwrap().set("k", json!("v")).unwrap();

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.get("k").unwrap(), Some(json!("v")));
  }
}
