//! Namespaced, TTL-aware cache over a key-value store.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{CacheEntry, Clock, KeyValueStore, SystemClock};

/// Cache scoped to an immutable prefix.
///
/// Several caches may share one store; each only ever reads and writes keys
/// under `"<prefix>:"`. Expiry is lazy: a stale entry is simply reported as
/// absent on the next `get`.
#[derive(Clone)]
pub struct Cache {
  store: Arc<dyn KeyValueStore>,
  prefix: Arc<str>,
  clock: Arc<dyn Clock>,
}

impl Cache {
  /// The prefix must be non-empty and free of `:`, otherwise one cache's
  /// namespace could contain another's (`jira` and `jira:meta`).
  pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str) -> Result<Self> {
    if prefix.is_empty() || prefix.contains(':') {
      return Err(eyre!(
        "Invalid cache prefix '{}': must be non-empty and contain no ':'",
        prefix
      ));
    }

    Ok(Self {
      store,
      prefix: Arc::from(prefix),
      clock: Arc::new(SystemClock),
    })
  }

  /// Replace the clock used for freshness checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  fn namespace(&self) -> String {
    format!("{}:", self.prefix)
  }

  fn namespaced(&self, key: &str) -> String {
    format!("{}:{}", self.prefix, key)
  }

  /// Look up `key`. A miss, a stale entry and `invalidate == true` all
  /// yield `Ok(None)`.
  pub fn get(&self, key: &str, invalidate: bool) -> Result<Option<Value>> {
    if invalidate {
      debug!(cache = %self.prefix, key, "cache bypassed");
      return Ok(None);
    }

    let raw = match self.store.get(&self.namespaced(key))? {
      Some(raw) => raw,
      None => {
        debug!(cache = %self.prefix, key, "cache miss");
        return Ok(None);
      }
    };

    let entry: CacheEntry = match serde_json::from_value(raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(cache = %self.prefix, key, error = %e, "ignoring malformed cache entry");
        return Ok(None);
      }
    };

    if !entry.is_fresh(self.clock.now()) {
      debug!(cache = %self.prefix, key, "cache entry expired");
      return Ok(None);
    }

    debug!(cache = %self.prefix, key, "cache hit");
    Ok(Some(entry.value))
  }

  /// [`get`](Self::get) followed by the unserialize step for `T`.
  ///
  /// A payload that no longer decodes as `T` is treated as a miss.
  pub fn get_as<T: DeserializeOwned>(&self, key: &str, invalidate: bool) -> Result<Option<T>> {
    let Some(value) = self.get(key, invalidate)? else {
      return Ok(None);
    };

    match serde_json::from_value(value) {
      Ok(decoded) => Ok(Some(decoded)),
      Err(e) => {
        warn!(cache = %self.prefix, key, error = %e, "cached payload does not decode");
        Ok(None)
      }
    }
  }

  /// Returns a continuation that stores its argument under `key` and hands it
  /// back unchanged, for use as `producer().await.and_then(...)`.
  pub fn set_thenable(&self, key: &str, ttl: Duration) -> impl FnOnce(Value) -> Result<Value> + Send {
    let writer = self.writer(key, ttl);
    move |value: Value| {
      writer(value.clone())?;
      Ok(value)
    }
  }

  /// Like [`set_thenable`](Self::set_thenable), but stores the serialized
  /// form of a domain value. Readers decode hits with [`get_as`](Self::get_as).
  pub fn set_serialized_thenable<T: Serialize>(
    &self,
    key: &str,
    ttl: Duration,
  ) -> impl FnOnce(T) -> Result<T> + Send {
    let writer = self.writer(key, ttl);
    move |value: T| {
      let serialized =
        serde_json::to_value(&value).map_err(|e| eyre!("Failed to serialize cache value: {}", e))?;
      writer(serialized)?;
      Ok(value)
    }
  }

  fn writer(&self, key: &str, ttl: Duration) -> impl FnOnce(Value) -> Result<()> + Send {
    let store = Arc::clone(&self.store);
    let clock = Arc::clone(&self.clock);
    let key = self.namespaced(key);
    let prefix = Arc::clone(&self.prefix);
    move |value: Value| {
      let entry = CacheEntry::new(value, clock.now(), ttl);
      let raw = serde_json::to_value(&entry).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;
      store.set(&key, raw)?;
      debug!(cache = %prefix, key = %key, ttl_ms = entry.ttl_ms, "cache stored");
      Ok(())
    }
  }

  /// Drop the entry for `key`.
  pub fn invalidate(&self, key: &str) -> Result<()> {
    self.store.delete(&self.namespaced(key))?;
    Ok(())
  }

  /// Drop every entry under this cache's prefix. Other prefixes sharing the
  /// store are untouched.
  pub fn invalidate_all(&self) -> Result<usize> {
    let removed = self.store.delete_prefix(&self.namespace())?;
    debug!(cache = %self.prefix, removed, "cache cleared");
    Ok(removed)
  }

  /// Memoize an async producer: serve a fresh hit, otherwise await the
  /// producer and store its result.
  pub async fn remember<T, F, Fut>(
    &self,
    key: &str,
    ttl: Duration,
    invalidate: bool,
    producer: F,
  ) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(hit) = self.get_as::<T>(key, invalidate)? {
      return Ok(hit);
    }

    producer()
      .await
      .and_then(self.set_serialized_thenable(key, ttl))
  }
}

impl std::fmt::Debug for Cache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cache").field("prefix", &self.prefix).finish()
  }
}
