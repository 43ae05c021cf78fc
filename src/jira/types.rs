use serde::{Deserialize, Serialize};

/// Summary of an issue for list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
  pub key: String,
  pub summary: String,
  pub status: String,
  pub status_id: String,
  pub issue_type: String,
  pub assignee: Option<String>,
  pub priority: Option<String>,
}

/// Full issue details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
  pub key: String,
  pub summary: String,
  pub description: Option<String>,
  pub status: String,
  pub status_id: String,
  pub issue_type: String,
  pub assignee: Option<String>,
  pub reporter: Option<String>,
  pub priority: Option<String>,
  pub labels: Vec<String>,
  pub created: String,
  pub updated: String,
}

/// Board summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
  pub id: u64,
  pub name: String,
  pub board_type: String, // "scrum" or "kanban"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub key: String,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueType {
  pub id: String,
  pub name: String,
  pub subtask: bool,
}

/// A workflow status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
  pub id: String,
  pub name: String,
  /// "To Do", "In Progress" or "Done"
  pub category: Option<String>,
}

/// A transition available on an issue, and the status it leads to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
  pub id: String,
  pub name: String,
  pub to: Status,
}
