//! Small persisted application state.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;

use crate::cache::KeyValueStore;

const LAST_QUERY: &str = "state:last_query";
const RECENT: &str = "state:recent";
const RECENT_LIMIT: usize = 20;

/// Last query and recently viewed issues, kept in the `storage` store.
#[derive(Clone)]
pub struct AppState {
  store: Arc<dyn KeyValueStore>,
}

impl AppState {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  pub fn last_query(&self) -> Result<Option<String>> {
    Ok(
      self
        .store
        .get(LAST_QUERY)?
        .and_then(|v| v.as_str().map(String::from)),
    )
  }

  pub fn set_last_query(&self, jql: &str) -> Result<()> {
    self.store.set(LAST_QUERY, Value::String(jql.to_string()))
  }

  /// Most recent first.
  pub fn recent(&self) -> Result<Vec<String>> {
    match self.store.get(RECENT)? {
      Some(value) => {
        serde_json::from_value(value).map_err(|e| eyre!("Malformed recent issue list: {}", e))
      }
      None => Ok(Vec::new()),
    }
  }

  /// Move `key` to the front of the recent list.
  pub fn record_viewed(&self, key: &str) -> Result<()> {
    let mut recent = self.recent()?;
    recent.retain(|k| k != key);
    recent.insert(0, key.to_string());
    recent.truncate(RECENT_LIMIT);
    self.store.set(RECENT, serde_json::json!(recent))
  }
}
