//! Issue repository capability and its proxied forms.
//!
//! [`JiraRepository`] talks to the backend directly. Caching and retrying are
//! added by wrapping an `Arc<dyn IssueRepository>` with the `cachable` and
//! `retryable` behaviours; both wrappers keep the same interface.

use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{CacheConfig, RetryConfig};
use crate::container::Decorate;
use crate::proxy::{CacheOptions, CacheProxy, KeyRule, RetryOptions, RetryProxy};

use super::client::TrackerBackend;
use super::metadata::Metadata;
use super::types::{Board, Issue, IssueSummary, Transition};

/// Issue reads and writes. `refresh` bypasses any cached result.
#[async_trait]
pub trait IssueRepository: Send + Sync {
  async fn search(&self, jql: &str, refresh: bool) -> Result<Vec<IssueSummary>>;
  async fn issue(&self, key: &str, refresh: bool) -> Result<Issue>;
  async fn boards(&self, project: Option<&str>, refresh: bool) -> Result<Vec<Board>>;
  /// Move `key` to the status named `status`.
  async fn transition(&self, key: &str, status: &str) -> Result<Transition>;
}

/// Handle the rest of the application holds.
pub type Tracker = Arc<dyn IssueRepository>;

/// Method table for the `cachable` behaviour.
pub fn cache_options(config: &CacheConfig) -> CacheOptions {
  CacheOptions::new()
    .method("search", config.search_ttl(), KeyRule::Hashed)
    .method("issue", config.issue_ttl(), KeyRule::MethodWithArgs)
    .method("boards", config.metadata_ttl(), KeyRule::MethodWithArgs)
}

/// Method table for the `retryable` behaviour. Transitions are not idempotent
/// and are left out.
pub fn retry_options(config: &RetryConfig) -> RetryOptions {
  RetryOptions::new(config.policy())
    .method("search")
    .method("issue")
    .method("boards")
}

pub struct JiraRepository {
  backend: Arc<dyn TrackerBackend>,
  metadata: Metadata,
}

impl JiraRepository {
  pub fn new(backend: Arc<dyn TrackerBackend>, metadata: Metadata) -> Self {
    Self { backend, metadata }
  }
}

#[async_trait]
impl IssueRepository for JiraRepository {
  async fn search(&self, jql: &str, _refresh: bool) -> Result<Vec<IssueSummary>> {
    self.backend.search(jql).await
  }

  async fn issue(&self, key: &str, _refresh: bool) -> Result<Issue> {
    self.backend.issue(key).await
  }

  async fn boards(&self, project: Option<&str>, _refresh: bool) -> Result<Vec<Board>> {
    self.backend.boards(project).await
  }

  async fn transition(&self, key: &str, status: &str) -> Result<Transition> {
    let transition = self.metadata.find_transition(key, status).await?;
    self.backend.transition(key, &transition.id).await?;
    self.metadata.forget_transitions(key)?;
    info!(issue = key, to = %transition.to.name, "issue transitioned");
    Ok(transition)
  }
}

fn args(project: Option<&str>) -> Vec<&str> {
  project.into_iter().collect()
}

struct CachedRepository {
  inner: Tracker,
  proxy: CacheProxy,
  options: CacheOptions,
}

#[async_trait]
impl IssueRepository for CachedRepository {
  async fn search(&self, jql: &str, refresh: bool) -> Result<Vec<IssueSummary>> {
    self
      .proxy
      .call(&self.options, "search", &[jql], refresh, || {
        self.inner.search(jql, refresh)
      })
      .await
  }

  async fn issue(&self, key: &str, refresh: bool) -> Result<Issue> {
    self
      .proxy
      .call(&self.options, "issue", &[key], refresh, || {
        self.inner.issue(key, refresh)
      })
      .await
  }

  async fn boards(&self, project: Option<&str>, refresh: bool) -> Result<Vec<Board>> {
    self
      .proxy
      .call(&self.options, "boards", &args(project), refresh, || {
        self.inner.boards(project, refresh)
      })
      .await
  }

  async fn transition(&self, key: &str, status: &str) -> Result<Transition> {
    let transition = self.inner.transition(key, status).await?;
    self.proxy.forget(&self.options, "issue", &[key])?;
    Ok(transition)
  }
}

impl Decorate<CacheProxy> for Tracker {
  fn decorate(self, proxy: &CacheProxy, options: CacheOptions) -> Self {
    Arc::new(CachedRepository {
      inner: self,
      proxy: proxy.clone(),
      options,
    })
  }
}

struct RetryingRepository {
  inner: Tracker,
  proxy: RetryProxy,
  options: RetryOptions,
}

#[async_trait]
impl IssueRepository for RetryingRepository {
  async fn search(&self, jql: &str, refresh: bool) -> Result<Vec<IssueSummary>> {
    self
      .proxy
      .call(&self.options, "search", || self.inner.search(jql, refresh))
      .await
  }

  async fn issue(&self, key: &str, refresh: bool) -> Result<Issue> {
    self
      .proxy
      .call(&self.options, "issue", || self.inner.issue(key, refresh))
      .await
  }

  async fn boards(&self, project: Option<&str>, refresh: bool) -> Result<Vec<Board>> {
    self
      .proxy
      .call(&self.options, "boards", || self.inner.boards(project, refresh))
      .await
  }

  async fn transition(&self, key: &str, status: &str) -> Result<Transition> {
    self
      .proxy
      .call(&self.options, "transition", || self.inner.transition(key, status))
      .await
  }
}

impl Decorate<RetryProxy> for Tracker {
  fn decorate(self, proxy: &RetryProxy, options: RetryOptions) -> Self {
    Arc::new(RetryingRepository {
      inner: self,
      proxy: proxy.clone(),
      options,
    })
  }
}
