//! Persistent TTL cache.
//!
//! This module provides a tracker-agnostic caching mechanism that:
//! - Keeps a resident key-value table, optionally mirrored to a JSON file or SQLite
//! - Namespaces keys by a per-cache prefix so caches can share one store
//! - Stores timestamped entries and expires them lazily on read
//! - Offers memoization helpers for async producers

mod layer;
mod storage;
mod store;
mod traits;

pub use layer::Cache;
pub use storage::SqliteStore;
pub use store::{DiskStore, MemoryStore};
#[cfg(test)]
pub use traits::ManualClock;
pub use traits::KeyValueStore;
