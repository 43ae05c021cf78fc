//! Slow-changing tracker metadata, cached directly through [`Cache`].

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::Cache;

use super::client::TrackerBackend;
use super::types::{IssueType, Project, Status, Transition};

/// Projects, issue types, statuses and transitions.
///
/// Unlike the issue repository this service does not go through a proxy: each
/// lookup reads the cache and, on a miss, fetches and stores in one chain.
#[derive(Clone)]
pub struct Metadata {
  backend: Arc<dyn TrackerBackend>,
  cache: Cache,
  ttl: Duration,
}

impl Metadata {
  pub fn new(backend: Arc<dyn TrackerBackend>, cache: Cache, ttl: Duration) -> Self {
    Self {
      backend,
      cache,
      ttl,
    }
  }

  async fn cached<T, Fut>(&self, key: &str, invalidate: bool, fetch: Fut) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(hit) = self.cache.get_as::<T>(key, invalidate)? {
      return Ok(hit);
    }

    fetch
      .await
      .and_then(self.cache.set_serialized_thenable(key, self.ttl))
  }

  pub async fn projects(&self, invalidate: bool) -> Result<Vec<Project>> {
    self
      .cached("meta:projects", invalidate, self.backend.projects())
      .await
  }

  pub async fn issue_types(&self, invalidate: bool) -> Result<Vec<IssueType>> {
    self
      .cached("meta:issue_types", invalidate, self.backend.issue_types())
      .await
  }

  pub async fn statuses(&self, project: &str, invalidate: bool) -> Result<Vec<Status>> {
    let key = format!("meta:statuses:{}", project);
    self
      .cached(&key, invalidate, self.backend.statuses(project))
      .await
  }

  pub async fn transitions(&self, issue: &str, invalidate: bool) -> Result<Vec<Transition>> {
    let key = format!("meta:transitions:{}", issue);
    self
      .cached(&key, invalidate, self.backend.transitions(issue))
      .await
  }

  /// Drop cached transitions of `issue`; they change whenever it moves.
  pub fn forget_transitions(&self, issue: &str) -> Result<()> {
    self.cache.invalidate(&format!("meta:transitions:{}", issue))
  }

  /// The transition of `issue` leading to the status named `status`
  /// (case-insensitive). A cached list without a match is refreshed once
  /// before giving up.
  pub async fn find_transition(&self, issue: &str, status: &str) -> Result<Transition> {
    for invalidate in [false, true] {
      let transitions = self.transitions(issue, invalidate).await?;
      if let Some(found) = transitions
        .into_iter()
        .find(|t| t.to.name.eq_ignore_ascii_case(status))
      {
        return Ok(found);
      }
      debug!(issue, status, invalidate, "no matching transition");
    }

    Err(eyre!("No transition available from {} to status '{}'", issue, status))
  }
}

impl std::fmt::Debug for Metadata {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Metadata")
      .field("cache", &self.cache)
      .field("ttl", &self.ttl)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{ManualClock, MemoryStore};
  use crate::jira::testing::FakeBackend;
  use std::sync::atomic::Ordering;

  const DAY: Duration = Duration::from_secs(86_400);

  fn setup() -> (Arc<FakeBackend>, Metadata, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = Cache::new(Arc::new(MemoryStore::new()), "jira")
      .unwrap()
      .with_clock(clock.clone());
    let backend = Arc::new(FakeBackend::default());
    let metadata = Metadata::new(backend.clone(), cache, DAY);
    (backend, metadata, clock)
  }

  #[tokio::test]
  async fn test_projects_cached_for_a_day() {
    let (backend, metadata, clock) = setup();

    metadata.projects(false).await.unwrap();
    metadata.projects(false).await.unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    clock.advance(DAY);
    let projects = metadata.projects(false).await.unwrap();
    assert_eq!(projects[0].key, "OPS");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidate_refetches() {
    let (backend, metadata, _) = setup();

    metadata.issue_types(false).await.unwrap();
    metadata.issue_types(true).await.unwrap();
    metadata.issue_types(false).await.unwrap();

    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_statuses_keyed_per_project() {
    let (backend, metadata, _) = setup();

    metadata.statuses("OPS", false).await.unwrap();
    metadata.statuses("WEB", false).await.unwrap();
    metadata.statuses("OPS", false).await.unwrap();

    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_find_transition_case_insensitive() {
    let (_, metadata, _) = setup();

    let transition = metadata.find_transition("OPS-1", "in progress").await.unwrap();
    assert_eq!(transition.id, "21");
  }

  #[tokio::test]
  async fn test_find_transition_refreshes_stale_list() {
    let (backend, metadata, _) = setup();

    metadata.transitions("OPS-1", false).await.unwrap();
    backend.add_transition("OPS-1", "41", "Blocked");

    let transition = metadata.find_transition("OPS-1", "Blocked").await.unwrap();
    assert_eq!(transition.id, "41");
  }

  #[tokio::test]
  async fn test_find_transition_unknown_status() {
    let (_, metadata, _) = setup();

    let err = metadata.find_transition("OPS-1", "Shipped").await.unwrap_err();
    assert!(err.to_string().contains("Shipped"));
  }

  #[tokio::test]
  async fn test_backend_failure_not_cached() {
    let (backend, metadata, _) = setup();

    backend.fail_next(1);
    assert!(metadata.projects(false).await.is_err());
    assert!(metadata.projects(false).await.is_ok());
  }
}
