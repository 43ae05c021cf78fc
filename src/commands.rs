//! CLI subcommands, run against resolved services.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::fmt::Write as _;
use tracing::info;

use crate::bootstrap::keys;
use crate::container::ServiceContainer;
use crate::jira::types::{Issue, IssueSummary};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Search issues with JQL (default: the last query, then the default project)
  #[command(alias = "i")]
  Issues {
    jql: Option<String>,
    /// Skip the cache
    #[arg(short, long)]
    refresh: bool,
  },
  /// Show one issue
  Issue {
    key: String,
    #[arg(short, long)]
    refresh: bool,
  },
  /// List agile boards
  #[command(alias = "b")]
  Boards {
    #[arg(short, long)]
    project: Option<String>,
  },
  /// List the statuses of a project
  Statuses {
    #[arg(short, long)]
    project: Option<String>,
  },
  /// List issue types
  Types,
  /// Move an issue to the named status
  Move { key: String, status: String },
  /// Recently viewed issues
  Recent,
  /// Cache maintenance
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
  /// Drop every cached entry under the configured prefix
  Clear,
}

impl Command {
  /// Run the command and return what to print.
  pub async fn run(self, container: &ServiceContainer) -> Result<String> {
    match self {
      Command::Issues { jql, refresh } => {
        let state = container.get(keys::STATE)?;
        let jql = match jql {
          Some(jql) => jql,
          None => match state.last_query()? {
            Some(last) => last,
            None => default_query(container)?,
          },
        };
        let issues = container.get(keys::TRACKER)?.search(&jql, refresh).await?;
        state.set_last_query(&jql)?;
        Ok(format_issue_list(&issues))
      }
      Command::Issue { key, refresh } => {
        let issue = container.get(keys::TRACKER)?.issue(&key, refresh).await?;
        container.get(keys::STATE)?.record_viewed(&issue.key)?;
        Ok(format_issue(&issue))
      }
      Command::Boards { project } => {
        let project = project.or(container.get(keys::CONFIG)?.default_project);
        let boards = container
          .get(keys::TRACKER)?
          .boards(project.as_deref(), false)
          .await?;
        Ok(
          boards
            .iter()
            .map(|b| format!("{:>6}  {:<8} {}\n", b.id, b.board_type, b.name))
            .collect(),
        )
      }
      Command::Statuses { project } => {
        let project = project
          .or(container.get(keys::CONFIG)?.default_project)
          .ok_or_else(|| eyre!("No project given and no default_project configured"))?;
        let statuses = container.get(keys::METADATA)?.statuses(&project, false).await?;
        Ok(
          statuses
            .iter()
            .map(|s| match &s.category {
              Some(category) => format!("{} ({})\n", s.name, category),
              None => format!("{}\n", s.name),
            })
            .collect(),
        )
      }
      Command::Types => {
        let types = container.get(keys::METADATA)?.issue_types(false).await?;
        Ok(
          types
            .iter()
            .filter(|t| !t.subtask)
            .map(|t| format!("{}\n", t.name))
            .collect(),
        )
      }
      Command::Move { key, status } => {
        let transition = container.get(keys::TRACKER)?.transition(&key, &status).await?;
        Ok(format!("{} -> {}\n", key, transition.to.name))
      }
      Command::Recent => Ok(
        container
          .get(keys::STATE)?
          .recent()?
          .iter()
          .map(|k| format!("{}\n", k))
          .collect(),
      ),
      Command::Cache {
        action: CacheAction::Clear,
      } => {
        let cache = container.get(keys::CACHE)?;
        let removed = cache.invalidate_all()?;
        container.get(keys::CACHE_STORAGE)?.flush()?;
        info!(prefix = cache.prefix(), removed, "cache cleared");
        Ok(format!("Removed {} cached entries\n", removed))
      }
    }
  }
}

fn default_query(container: &ServiceContainer) -> Result<String> {
  let config = container.get(keys::CONFIG)?;
  match config.default_project {
    Some(project) => Ok(format!(
      "project = {} AND resolution = Unresolved ORDER BY updated DESC",
      project
    )),
    None => Err(eyre!("No JQL given and no default_project configured")),
  }
}

fn format_issue_list(issues: &[IssueSummary]) -> String {
  let mut out = String::new();
  for issue in issues {
    let _ = writeln!(
      out,
      "{:<12} {:<14} {:<12} {}",
      issue.key,
      issue.status,
      issue.assignee.as_deref().unwrap_or("-"),
      issue.summary
    );
  }
  out
}

fn format_issue(issue: &Issue) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}  {}", issue.key, issue.summary);
  let _ = writeln!(out, "Type:     {}", issue.issue_type);
  let _ = writeln!(out, "Status:   {}", issue.status);
  let _ = writeln!(
    out,
    "Assignee: {}",
    issue.assignee.as_deref().unwrap_or("Unassigned")
  );
  if let Some(priority) = &issue.priority {
    let _ = writeln!(out, "Priority: {}", priority);
  }
  if !issue.labels.is_empty() {
    let _ = writeln!(out, "Labels:   {}", issue.labels.join(", "));
  }
  let _ = writeln!(out, "Updated:  {}", issue.updated);
  if let Some(description) = &issue.description {
    let _ = writeln!(out, "\n{}", description.trim_end());
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bootstrap::{build_core, build_tracker, BootstrapOptions, StoreBackend};
  use crate::jira::testing::FakeBackend;
  use crate::jira::TrackerBackend;
  use std::sync::atomic::Ordering;
  use std::sync::Arc;
  use tempfile::TempDir;

  fn setup(dir: &TempDir, default_project: bool) -> (Arc<ServiceContainer>, Arc<FakeBackend>) {
    let config = dir.path().join("config.yaml");
    let mut yaml = "jira:\n  url: https://example.atlassian.net\n  email: dev@example.com\n".to_string();
    if default_project {
      yaml.push_str("default_project: OPS\n");
    }
    std::fs::write(&config, yaml).unwrap();

    let options = BootstrapOptions {
      config_file: Some(config),
      cache_file: Some(dir.path().join("cache.json")),
      state_file: Some(dir.path().join("state.json")),
      log_dir: Some(dir.path().to_path_buf()),
      log_level: "info".to_string(),
      clear_cache: false,
      cache_prefix: "jira".to_string(),
      store: StoreBackend::Json,
    };

    let container = Arc::new(ServiceContainer::new());
    build_core(&container, &options).unwrap();
    let backend = Arc::new(FakeBackend::default());
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

  #[tokio::test]
  async fn test_issue_records_recent() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _) = setup(&dir, false);

    let shown = Command::Issue {
      key: "OPS-9".to_string(),
      refresh: false,
    }
    .run(&container)
    .await
    .unwrap();
    let recent = Command::Recent.run(&container).await.unwrap();

    assert!(shown.starts_with("OPS-9  Summary of OPS-9"));
    assert_eq!(recent, "OPS-9\n");
  }

  #[tokio::test]
  async fn test_issues_reuses_last_query() {
    let dir = tempfile::tempdir().unwrap();
    let (container, backend) = setup(&dir, false);

    Command::Issues {
      jql: Some("assignee = me".to_string()),
      refresh: false,
    }
    .run(&container)
    .await
    .unwrap();
    Command::Issues {
      jql: None,
      refresh: false,
    }
    .run(&container)
    .await
    .unwrap();

    // Second run hits the cached search for the same JQL.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_issues_without_query_or_project() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _) = setup(&dir, false);

    let err = Command::Issues {
      jql: None,
      refresh: false,
    }
    .run(&container)
    .await
    .unwrap_err();

    assert!(err.to_string().contains("default_project"));
  }

  #[tokio::test]
  async fn test_statuses_use_default_project() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _) = setup(&dir, true);

    let out = Command::Statuses { project: None }
      .run(&container)
      .await
      .unwrap();

    assert_eq!(out, "To Do\nIn Progress\nDone\n");
  }

  #[tokio::test]
  async fn test_move_reports_target_status() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _) = setup(&dir, false);

    let out = Command::Move {
      key: "OPS-1".to_string(),
      status: "in progress".to_string(),
    }
    .run(&container)
    .await
    .unwrap();

    assert_eq!(out, "OPS-1 -> In Progress\n");
  }

  #[tokio::test]
  async fn test_cache_clear() {
    let dir = tempfile::tempdir().unwrap();
    let (container, backend) = setup(&dir, false);

    Command::Types.run(&container).await.unwrap();
    let out = Command::Cache {
      action: CacheAction::Clear,
    }
    .run(&container)
    .await
    .unwrap();
    Command::Types.run(&container).await.unwrap();

    assert_eq!(out, "Removed 1 cached entries\n");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_cache_clear_rewrites_store_file() {
    let dir = tempfile::tempdir().unwrap();
    let (container, _) = setup(&dir, false);
    container.get(keys::CACHE).unwrap();
    let cache_file = dir.path().join("cache.json");
    std::fs::remove_file(&cache_file).unwrap();

    let out = Command::Cache {
      action: CacheAction::Clear,
    }
    .run(&container)
    .await
    .unwrap();

    assert_eq!(out, "Removed 0 cached entries\n");
    assert_eq!(std::fs::read_to_string(&cache_file).unwrap(), "{}");
  }
}
