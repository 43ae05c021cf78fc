//! In-memory tracker for tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::client::TrackerBackend;
use super::types::{Board, Issue, IssueSummary, IssueType, Project, Status, Transition};

/// Counts every call; `fail_next(n)` makes the next `n` calls fail.
#[derive(Default)]
pub struct FakeBackend {
  pub calls: AtomicUsize,
  failures: AtomicUsize,
  extra_transitions: Mutex<HashMap<String, Vec<Transition>>>,
  pub moves: Mutex<Vec<(String, String)>>,
}

fn status(id: &str, name: &str) -> Status {
  Status {
    id: id.to_string(),
    name: name.to_string(),
    category: None,
  }
}

pub fn summary(key: &str) -> IssueSummary {
  IssueSummary {
    key: key.to_string(),
    summary: format!("Summary of {}", key),
    status: "To Do".to_string(),
    status_id: "1".to_string(),
    issue_type: "Task".to_string(),
    assignee: None,
    priority: None,
  }
}

impl FakeBackend {
  pub fn fail_next(&self, n: usize) {
    self.failures.store(n, Ordering::SeqCst);
  }

  pub fn add_transition(&self, issue: &str, id: &str, to: &str) {
    self
      .extra_transitions
      .lock()
      .unwrap()
      .entry(issue.to_string())
      .or_default()
      .push(Transition {
        id: id.to_string(),
        name: to.to_string(),
        to: status(id, to),
      });
  }

  fn call(&self) -> Result<()> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let pending = self.failures.load(Ordering::SeqCst);
    if pending > 0 {
      self.failures.store(pending - 1, Ordering::SeqCst);
      return Err(eyre!("tracker unavailable"));
    }
    Ok(())
  }
}

#[async_trait]
impl TrackerBackend for FakeBackend {
  async fn search(&self, jql: &str) -> Result<Vec<IssueSummary>> {
    self.call()?;
    let count = self.calls.load(Ordering::SeqCst);
    Ok(vec![summary(&format!("{}-{}", jql.len(), count))])
  }

  async fn issue(&self, key: &str) -> Result<Issue> {
    self.call()?;
    let s = summary(key);
    Ok(Issue {
      key: s.key,
      summary: s.summary,
      description: None,
      status: s.status,
      status_id: s.status_id,
      issue_type: s.issue_type,
      assignee: None,
      reporter: None,
      priority: None,
      labels: vec![],
      created: "2024-01-01T00:00:00Z".to_string(),
      updated: format!("call {}", self.calls.load(Ordering::SeqCst)),
    })
  }

  async fn boards(&self, project: Option<&str>) -> Result<Vec<Board>> {
    self.call()?;
    Ok(vec![Board {
      id: 1,
      name: format!("{} board", project.unwrap_or("All")),
      board_type: "kanban".to_string(),
    }])
  }

  async fn projects(&self) -> Result<Vec<Project>> {
    self.call()?;
    Ok(vec![Project {
      id: "10000".to_string(),
      key: "OPS".to_string(),
      name: "Operations".to_string(),
    }])
  }

  async fn issue_types(&self) -> Result<Vec<IssueType>> {
    self.call()?;
    Ok(vec![IssueType {
      id: "1".to_string(),
      name: "Task".to_string(),
      subtask: false,
    }])
  }

  async fn statuses(&self, _project: &str) -> Result<Vec<Status>> {
    self.call()?;
    Ok(vec![status("1", "To Do"), status("3", "In Progress"), status("5", "Done")])
  }

  async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
    self.call()?;
    let mut transitions: Vec<Transition> = [("11", "To Do"), ("21", "In Progress"), ("31", "Done")]
      .into_iter()
      .map(|(id, to)| Transition {
        id: id.to_string(),
        name: to.to_string(),
        to: status(id, to),
      })
      .collect();
    if let Some(extra) = self.extra_transitions.lock().unwrap().get(key) {
      transitions.extend(extra.iter().cloned());
    }
    Ok(transitions)
  }

  async fn transition(&self, key: &str, transition_id: &str) -> Result<()> {
    self.call()?;
    self
      .moves
      .lock()
      .unwrap()
      .push((key.to_string(), transition_id.to_string()));
    Ok(())
  }
}
