//! Resident key-value stores: in-memory and JSON-file backed.

use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::traits::KeyValueStore;

type Table = Map<String, Value>;

/// Store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  table: Mutex<Table>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn from_table(table: Table) -> Self {
    Self {
      table: Mutex::new(table),
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Table>> {
    self
      .table
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn remove_prefix(table: &mut Table, prefix: &str) -> usize {
  let before = table.len();
  table.retain(|key, _| !key.starts_with(prefix));
  before - table.len()
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    self.lock()?.insert(key.to_string(), value);
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<bool> {
    Ok(self.lock()?.remove(key).is_some())
  }

  fn delete_prefix(&self, prefix: &str) -> Result<usize> {
    let mut table = self.lock()?;
    Ok(remove_prefix(&mut table, prefix))
  }

  fn keys(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  fn flush(&self) -> Result<()> {
    Ok(())
  }
}

/// Memory store mirrored to a JSON file.
///
/// The file is read once at construction (created as `{}` if missing) and
/// the whole table is rewritten after every mutation, while the table lock
/// is still held. Writes go to a sibling temp file that is then renamed over
/// the store file, so a reader never sees a partial table. A mutation whose
/// write fails is undone in memory, so the table never runs ahead of the file.
#[derive(Debug)]
pub struct DiskStore {
  path: PathBuf,
  memory: MemoryStore,
}

impl DiskStore {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();

    if !path.exists() {
      if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create directory {}: {}", parent.display(), e))?;
      }
      std::fs::write(&path, "{}")
        .map_err(|e| eyre!("Failed to create store file {}: {}", path.display(), e))?;
    }

    let contents = std::fs::read_to_string(&path)
      .map_err(|e| eyre!("Failed to read store file {}: {}", path.display(), e))?;
    let table: Table = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Malformed store file {}: {}", path.display(), e))?;

    debug!(path = %path.display(), entries = table.len(), "loaded store");

    Ok(Self {
      path,
      memory: MemoryStore::from_table(table),
    })
  }

  fn write(&self, table: &Table) -> Result<()> {
    let file_name = self
      .path
      .file_name()
      .ok_or_else(|| eyre!("Store path has no file name: {}", self.path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = self.path.with_file_name(tmp_name);

    let data = serde_json::to_vec_pretty(table)
      .map_err(|e| eyre!("Failed to serialize store table: {}", e))?;
    std::fs::write(&tmp, data)
      .map_err(|e| eyre!("Failed to write {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, &self.path)
      .map_err(|e| eyre!("Failed to replace {}: {}", self.path.display(), e))?;

    Ok(())
  }
}

impl KeyValueStore for DiskStore {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    self.memory.get(key)
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    let mut table = self.memory.lock()?;
    let previous = table.insert(key.to_string(), value);
    if let Err(e) = self.write(&table) {
      match previous {
        Some(previous) => table.insert(key.to_string(), previous),
        None => table.remove(key),
      };
      return Err(e);
    }
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<bool> {
    let mut table = self.memory.lock()?;
    let Some(previous) = table.remove(key) else {
      return Ok(false);
    };
    if let Err(e) = self.write(&table) {
      table.insert(key.to_string(), previous);
      return Err(e);
    }
    Ok(true)
  }

  fn delete_prefix(&self, prefix: &str) -> Result<usize> {
    let mut table = self.memory.lock()?;
    let snapshot = table.clone();
    let removed = remove_prefix(&mut table, prefix);
    if removed > 0 {
      if let Err(e) = self.write(&table) {
        *table = snapshot;
        return Err(e);
      }
    }
    Ok(removed)
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.memory.keys()
  }

  fn flush(&self) -> Result<()> {
    let table = self.memory.lock()?;
    self.write(&table)
  }
}
