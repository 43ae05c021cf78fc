//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimal resident key-value table.
///
/// Implementations serialize all mutations against one store, so a
/// read-modify-flush sequence never interleaves with another writer.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<Value>>;

  fn set(&self, key: &str, value: Value) -> Result<()>;

  /// Remove `key`. Returns whether it was present.
  fn delete(&self, key: &str) -> Result<bool>;

  /// Remove every key starting with `prefix` in one mutation.
  /// Returns how many keys were removed.
  fn delete_prefix(&self, prefix: &str) -> Result<usize>;

  fn keys(&self) -> Result<Vec<String>>;

  /// Persist the current table. A no-op for stores without a backing file.
  fn flush(&self) -> Result<()>;
}

/// Source of wall-clock time for freshness checks.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A timestamped value as laid out in the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub value: Value,
  pub stored_at: DateTime<Utc>,
  pub ttl_ms: u64,
}

impl CacheEntry {
  pub fn new(value: Value, stored_at: DateTime<Utc>, ttl: std::time::Duration) -> Self {
    Self {
      value,
      stored_at,
      ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
    }
  }

  /// Fresh while `now - stored_at < ttl`.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    let ttl = Duration::milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX));
    now.signed_duration_since(self.stored_at) < ttl
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
  now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new() -> Self {
    Self {
      now: std::sync::Mutex::new(Utc::now()),
    }
  }

  pub fn advance(&self, by: std::time::Duration) {
    let mut now = self.now.lock().unwrap();
    *now += Duration::from_std(by).unwrap();
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap()
  }
}
