//! Process wiring: every long-lived object is registered here by name and
//! built on first use.

pub mod keys;

use clap::ValueEnum;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cache::{Cache, DiskStore, KeyValueStore, SqliteStore};
use crate::config::Config;
use crate::container::ServiceContainer;
use crate::jira::{
  cache_options, retry_options, JiraClient, JiraRepository, Metadata, Tracker, TrackerBackend,
};
use crate::logging::{self, Logger};
use crate::proxy::{CacheProxy, RetryProxy};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StoreBackend {
  /// One JSON file, rewritten on every change
  #[default]
  Json,
  /// SQLite database, one row per entry
  Sqlite,
}

/// Process-level settings, taken from the command line.
#[derive(Debug, Clone, clap::Args)]
pub struct BootstrapOptions {
  /// Path to config file (default: $XDG_CONFIG_HOME/trackr/config.yaml)
  #[arg(short, long = "config", global = true)]
  pub config_file: Option<PathBuf>,

  /// Cache file (default: $XDG_DATA_HOME/trackr/cache.json or cache.db)
  #[arg(long, global = true)]
  pub cache_file: Option<PathBuf>,

  /// Application state file (default: $XDG_DATA_HOME/trackr/state.json)
  #[arg(long, global = true)]
  pub state_file: Option<PathBuf>,

  /// Directory for trackr.log (default: $XDG_DATA_HOME/trackr)
  #[arg(long, global = true)]
  pub log_dir: Option<PathBuf>,

  /// error, warn, info, debug, trace or 0-4
  #[arg(long, default_value = "info", global = true)]
  pub log_level: String,

  /// Drop every cached entry under the cache prefix at startup
  #[arg(long, global = true)]
  pub clear_cache: bool,

  #[arg(long, default_value = "jira", global = true)]
  pub cache_prefix: String,

  /// Cache storage engine
  #[arg(long, value_enum, default_value_t = StoreBackend::Json, global = true)]
  pub store: StoreBackend,
}

fn data_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("trackr")
}

impl BootstrapOptions {
  pub fn cache_file(&self) -> PathBuf {
    self.cache_file.clone().unwrap_or_else(|| {
      data_dir().join(match self.store {
        StoreBackend::Json => "cache.json",
        StoreBackend::Sqlite => "cache.db",
      })
    })
  }

  pub fn state_file(&self) -> PathBuf {
    self
      .state_file
      .clone()
      .unwrap_or_else(|| data_dir().join("state.json"))
  }

  pub fn log_dir(&self) -> PathBuf {
    self.log_dir.clone().unwrap_or_else(data_dir)
  }
}

/// Register the tracker-independent services and the `cachable` and
/// `retryable` behaviours. Nothing is constructed yet.
pub fn build_core(container: &ServiceContainer, options: &BootstrapOptions) -> Result<()> {
  let opts = options.clone();
  container.register(keys::LOGGER, &[], move |_| {
    let level = logging::parse_level(&opts.log_level)?;
    logging::init(level, Some(&opts.log_dir()))
  })?;

  let opts = options.clone();
  container.register(keys::CONFIG, &[keys::LOGGER.name()], move |_| {
    Config::load(opts.config_file.as_deref())
  })?;

  let opts = options.clone();
  container.register(keys::STORAGE, &[keys::LOGGER.name()], move |_| {
    let store: Arc<dyn KeyValueStore> = Arc::new(DiskStore::open(opts.state_file())?);
    Ok(store)
  })?;

  let opts = options.clone();
  container.register(keys::CACHE_STORAGE, &[keys::LOGGER.name()], move |_| {
    let path = opts.cache_file();
    let store: Arc<dyn KeyValueStore> = match opts.store {
      StoreBackend::Json => Arc::new(DiskStore::open(path)?),
      StoreBackend::Sqlite => Arc::new(SqliteStore::open(&path)?),
    };
    Ok(store)
  })?;

  let opts = options.clone();
  container.register(
    keys::CACHE,
    &[keys::CACHE_STORAGE.name(), keys::LOGGER.name()],
    move |deps| {
      let store: Arc<dyn KeyValueStore> = deps.next()?;
      let cache = Cache::new(store, &opts.cache_prefix)?;
      if opts.clear_cache {
        let removed = cache.invalidate_all()?;
        info!(prefix = cache.prefix(), removed, "cache cleared at startup");
      }
      Ok(cache)
    },
  )?;

  container.register(keys::STATE, &[keys::STORAGE.name()], |deps| {
    Ok(AppState::new(deps.next()?))
  })?;

  container.register(keys::RETRY_PROXY, &[], |_| Ok(RetryProxy::default()))?;
  container.register(keys::CACHE_PROXY, &[keys::CACHE.name()], |deps| {
    Ok(CacheProxy::new(deps.next()?))
  })?;

  container.register_behaviour(keys::CACHABLE, &[keys::CACHE_PROXY.name()], |deps| {
    Ok(deps.next::<CacheProxy>()?)
  })?;
  container.register_behaviour(keys::RETRYABLE, &[keys::RETRY_PROXY.name()], |deps| {
    Ok(deps.next::<RetryProxy>()?)
  })?;

  Ok(())
}

/// Register the Jira API client as `tracker.jira.client`.
pub fn register_jira_client(container: &ServiceContainer) -> Result<()> {
  container.register(
    keys::JIRA_CLIENT,
    &[keys::CONFIG.name(), keys::LOGGER.name()],
    |deps| {
      let config: Config = deps.next()?;
      let client: Arc<dyn TrackerBackend> = Arc::new(JiraClient::new(&config)?);
      Ok(client)
    },
  )
}

/// Register metadata, the proxied issue repository and its `tracker` alias
/// on top of whatever `tracker.jira.client` resolves to.
pub fn build_tracker(container: &Arc<ServiceContainer>) -> Result<()> {
  container.register(
    keys::METADATA,
    &[keys::JIRA_CLIENT.name(), keys::CACHE.name(), keys::CONFIG.name()],
    |deps| {
      let backend: Arc<dyn TrackerBackend> = deps.next()?;
      let cache: Cache = deps.next()?;
      let config: Config = deps.next()?;
      Ok(Metadata::new(backend, cache, config.cache.metadata_ttl()))
    },
  )?;

  // The factory applies behaviours through the container itself; a weak
  // handle keeps the registry from owning its owner.
  let weak = Arc::downgrade(container);
  container.register(
    keys::REPOSITORY,
    &[
      keys::JIRA_CLIENT.name(),
      keys::METADATA.name(),
      keys::CONFIG.name(),
    ],
    move |deps| {
      let backend: Arc<dyn TrackerBackend> = deps.next()?;
      let metadata: Metadata = deps.next()?;
      let config: Config = deps.next()?;
      let container = weak
        .upgrade()
        .ok_or_else(|| eyre!("Service container dropped during resolution"))?;

      let base: Tracker = Arc::new(JiraRepository::new(backend, metadata));
      let cached = container.create_proxy::<CacheProxy, _>(
        keys::CACHABLE,
        base,
        cache_options(&config.cache),
      )?;
      container.create_proxy::<RetryProxy, _>(keys::RETRYABLE, cached, retry_options(&config.retry))
    },
  )?;

  container.register(keys::TRACKER, &[keys::REPOSITORY.name()], |deps| {
    Ok(deps.next::<Tracker>()?)
  })?;

  Ok(())
}

/// Everything a command needs, fully registered.
pub fn build(options: &BootstrapOptions) -> Result<Arc<ServiceContainer>> {
  let container = Arc::new(ServiceContainer::new());
  build_core(&container, options)?;
  register_jira_client(&container)?;
  build_tracker(&container)?;

  let logger: Logger = container.get(keys::LOGGER)?;
  info!(level = %logger.level(), store = ?options.store, "bootstrap complete");
  Ok(container)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::container::ContainerError;
  use crate::jira::testing::FakeBackend;
  use serde_json::json;
  use std::sync::atomic::Ordering;
  use std::time::Duration;
  use tempfile::TempDir;

  const CONFIG_YAML: &str = r#"
jira:
  url: https://example.atlassian.net
  email: dev@example.com
"#;

  fn options(dir: &TempDir) -> BootstrapOptions {
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, CONFIG_YAML).unwrap();
    BootstrapOptions {
      config_file: Some(config),
      cache_file: Some(dir.path().join("cache.json")),
      state_file: Some(dir.path().join("state.json")),
      log_dir: Some(dir.path().join("logs")),
      log_level: "debug".to_string(),
      clear_cache: false,
      cache_prefix: "jira".to_string(),
      store: StoreBackend::Json,
    }
  }

  fn with_fake_tracker(options: &BootstrapOptions) -> (Arc<ServiceContainer>, Arc<FakeBackend>) {
    let container = Arc::new(ServiceContainer::new());
    let backend = Arc::new(FakeBackend::default());
    build_core(&container, options).unwrap();

    let fake = backend.clone();
    container
      .register(keys::JIRA_CLIENT, &[], move |_| {
        let client: Arc<dyn TrackerBackend> = fake.clone();
        Ok(client)
      })
      .unwrap();
    build_tracker(&container).unwrap();
    (container, backend)
  }

  #[test]
  fn test_registers_every_service() {
    let dir = tempfile::tempdir().unwrap();
    let container = Arc::new(ServiceContainer::new());
    build_core(&container, &options(&dir)).unwrap();
    register_jira_client(&container).unwrap();
    build_tracker(&container).unwrap();

    for name in [
      "logger",
      "config",
      "storage",
      "cache.storage",
      "cache",
      "state",
      "proxy.cache",
      "proxy.retry",
      "tracker.jira.client",
      "tracker.jira.metadata",
      "tracker.jira.repository",
      "tracker",
    ] {
      assert!(container.contains(name), "{} not registered", name);
    }
    // Nothing was built, so the missing token has not been noticed yet.
    assert!(!dir.path().join("cache.json").exists());
  }

  #[test]
  fn test_building_core_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::new();
    build_core(&container, &options(&dir)).unwrap();

    let err = build_core(&container, &options(&dir)).unwrap_err();
    assert!(matches!(
      err.downcast_ref::<ContainerError>(),
      Some(ContainerError::DuplicateRegistration { .. })
    ));
  }

  #[test]
  fn test_cache_is_a_singleton() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::new();
    build_core(&container, &options(&dir)).unwrap();

    let a = container.get(keys::CACHE).unwrap();
    let b = container.get(keys::CACHE).unwrap();
    a.set_thenable("k", Duration::from_secs(60))(json!(1)).unwrap();

    assert_eq!(b.get("k", false).unwrap(), Some(json!(1)));
    let proxy = container.get(keys::CACHE_PROXY).unwrap();
    assert_eq!(proxy.cache().get("k", false).unwrap(), Some(json!(1)));
  }

  #[test]
  fn test_clear_cache_only_touches_its_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(&dir);
    {
      let store = DiskStore::open(opts.cache_file()).unwrap();
      store.set("jira:a", json!(1)).unwrap();
      store.set("jira2:b", json!(2)).unwrap();
      store.set("other:c", json!(3)).unwrap();
    }
    opts.clear_cache = true;

    let container = ServiceContainer::new();
    build_core(&container, &opts).unwrap();
    container.get(keys::CACHE).unwrap();

    let mut remaining = container.get(keys::CACHE_STORAGE).unwrap().keys().unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["jira2:b".to_string(), "other:c".to_string()]);
  }

  #[test]
  fn test_nested_cache_prefix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(&dir);
    opts.cache_prefix = "jira:meta".to_string();

    let container = ServiceContainer::new();
    build_core(&container, &opts).unwrap();

    let err = container.get(keys::CACHE).unwrap_err();
    assert!(format!("{:?}", err).contains("Invalid cache prefix 'jira:meta'"));
  }

  #[test]
  fn test_state_and_cache_use_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(&dir);
    let container = ServiceContainer::new();
    build_core(&container, &opts).unwrap();

    container
      .get(keys::STATE)
      .unwrap()
      .record_viewed("OPS-1")
      .unwrap();

    assert!(container.get(keys::CACHE_STORAGE).unwrap().keys().unwrap().is_empty());
    assert!(opts.state_file().exists());
  }

  #[test]
  fn test_sqlite_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(&dir);
    opts.store = StoreBackend::Sqlite;
    opts.cache_file = Some(dir.path().join("cache.db"));

    let container = ServiceContainer::new();
    build_core(&container, &opts).unwrap();
    let cache = container.get(keys::CACHE).unwrap();
    cache.set_thenable("k", Duration::from_secs(60))(json!("v")).unwrap();

    assert!(dir.path().join("cache.db").exists());
    assert_eq!(cache.get("k", false).unwrap(), Some(json!("v")));
  }

  #[test]
  fn test_invalid_log_level_fails_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(&dir);
    opts.log_level = "loud".to_string();

    let container = ServiceContainer::new();
    build_core(&container, &opts).unwrap();

    let err = container.get(keys::CACHE).unwrap_err();
    assert!(format!("{:?}", err).contains("Invalid log level"));
  }

  #[tokio::test]
  async fn test_tracker_is_cached_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (container, backend) = with_fake_tracker(&options(&dir));

    let tracker = container.get(keys::TRACKER).unwrap();
    backend.fail_next(1);
    let first = tracker.issue("OPS-1", false).await.unwrap();
    let second = tracker.issue("OPS-1", false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_tracker_aliases_repository() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _) = with_fake_tracker(&options(&dir));

    let tracker = container.get(keys::TRACKER).unwrap();
    let repository = container.get(keys::REPOSITORY).unwrap();

    assert!(Arc::ptr_eq(&tracker, &repository));
  }

  #[tokio::test]
  async fn test_metadata_shares_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (container, backend) = with_fake_tracker(&options(&dir));

    let metadata = container.get(keys::METADATA).unwrap();
    metadata.projects(false).await.unwrap();
    metadata.projects(false).await.unwrap();

    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let stored = container.get(keys::CACHE_STORAGE).unwrap().keys().unwrap();
    assert_eq!(stored, vec!["jira:meta:projects".to_string()]);
  }
}
