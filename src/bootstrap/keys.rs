//! Names of the registered services and behaviours, paired with their types.

use std::sync::Arc;

use crate::cache::{Cache, KeyValueStore};
use crate::config::Config;
use crate::container::ServiceKey;
use crate::jira::{Metadata, Tracker, TrackerBackend};
use crate::logging::Logger;
use crate::proxy::{CacheProxy, RetryProxy};
use crate::state::AppState;

pub const LOGGER: ServiceKey<Logger> = ServiceKey::new("logger");
pub const CONFIG: ServiceKey<Config> = ServiceKey::new("config");

/// Application state store, never cleared by `--clear-cache`
pub const STORAGE: ServiceKey<Arc<dyn KeyValueStore>> = ServiceKey::new("storage");
pub const CACHE_STORAGE: ServiceKey<Arc<dyn KeyValueStore>> = ServiceKey::new("cache.storage");
pub const CACHE: ServiceKey<Cache> = ServiceKey::new("cache");
pub const STATE: ServiceKey<AppState> = ServiceKey::new("state");

pub const CACHE_PROXY: ServiceKey<CacheProxy> = ServiceKey::new("proxy.cache");
pub const RETRY_PROXY: ServiceKey<RetryProxy> = ServiceKey::new("proxy.retry");

pub const JIRA_CLIENT: ServiceKey<Arc<dyn TrackerBackend>> = ServiceKey::new("tracker.jira.client");
pub const METADATA: ServiceKey<Metadata> = ServiceKey::new("tracker.jira.metadata");
pub const REPOSITORY: ServiceKey<Tracker> = ServiceKey::new("tracker.jira.repository");
pub const TRACKER: ServiceKey<Tracker> = ServiceKey::new("tracker");

// Behaviours
pub const CACHABLE: &str = "cachable";
pub const RETRYABLE: &str = "retryable";
