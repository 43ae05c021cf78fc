//! Serde-deserializable types matching Jira API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::types::{Issue, IssueSummary, IssueType, Project, Status, Transition};

/// Re-serialize a value through JSON to convert between compatible types.
/// Useful for converting gouqi's BTreeMap fields to our typed structs.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiStatusCategory {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
  pub id: String,
  pub name: String,
  #[serde(rename = "statusCategory")]
  pub category: Option<ApiStatusCategory>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssueType {
  #[serde(default)]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub subtask: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  #[serde(rename = "displayName")]
  pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPriority {
  pub name: String,
}

// ============================================================================
// Issue fields - used by search and issue endpoints
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiIssueFields {
  #[serde(default)]
  pub summary: String,
  pub status: Option<ApiStatus>,
  #[serde(rename = "issuetype")]
  pub issue_type: Option<ApiIssueType>,
  pub assignee: Option<ApiUser>,
  pub reporter: Option<ApiUser>,
  pub priority: Option<ApiPriority>,
  #[serde(default)]
  pub labels: Vec<String>,
  #[serde(default)]
  pub created: String,
  #[serde(default)]
  pub updated: String,
  // Description is complex (can be string or ADF), handled separately
  pub description: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  pub key: String,
  #[serde(default)]
  pub fields: ApiIssueFields,
}

// ============================================================================
// Metadata endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  pub id: String,
  pub key: String,
  pub name: String,
}

/// One entry of `/project/{key}/statuses`: the statuses of one issue type.
#[derive(Debug, Deserialize)]
pub struct ApiIssueTypeStatuses {
  #[serde(default)]
  pub statuses: Vec<ApiStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTransition {
  pub id: String,
  pub name: String,
  pub to: ApiStatus,
}

#[derive(Debug, Deserialize)]
pub struct ApiTransitionsResponse {
  #[serde(default)]
  pub transitions: Vec<ApiTransition>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiIssue {
  pub fn into_summary(self) -> IssueSummary {
    let f = self.fields;
    IssueSummary {
      key: self.key,
      summary: f.summary,
      status: f
        .status
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_default(),
      status_id: f.status.map(|s| s.id).unwrap_or_default(),
      issue_type: f.issue_type.map(|t| t.name).unwrap_or_default(),
      assignee: f.assignee.map(|u| u.display_name),
      priority: f.priority.map(|p| p.name),
    }
  }

  pub fn into_full(self) -> Issue {
    let f = self.fields;
    Issue {
      key: self.key,
      summary: f.summary,
      description: f.description.as_ref().and_then(extract_description),
      status: f
        .status
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_default(),
      status_id: f.status.map(|s| s.id).unwrap_or_default(),
      issue_type: f.issue_type.map(|t| t.name).unwrap_or_default(),
      assignee: f.assignee.map(|u| u.display_name),
      reporter: f.reporter.map(|u| u.display_name),
      priority: f.priority.map(|p| p.name),
      labels: f.labels,
      created: f.created,
      updated: f.updated,
    }
  }
}

impl From<ApiStatus> for Status {
  fn from(s: ApiStatus) -> Self {
    Status {
      id: s.id,
      name: s.name,
      category: s.category.map(|c| c.name),
    }
  }
}

impl From<ApiProject> for Project {
  fn from(p: ApiProject) -> Self {
    Project {
      id: p.id,
      key: p.key,
      name: p.name,
    }
  }
}

impl From<ApiIssueType> for IssueType {
  fn from(t: ApiIssueType) -> Self {
    IssueType {
      id: t.id,
      name: t.name,
      subtask: t.subtask,
    }
  }
}

impl From<ApiTransition> for Transition {
  fn from(t: ApiTransition) -> Self {
    Transition {
      id: t.id,
      name: t.name,
      to: t.to.into(),
    }
  }
}

/// Statuses of a project, deduplicated across issue types in first-seen order.
pub fn flatten_statuses(per_type: Vec<ApiIssueTypeStatuses>) -> Vec<Status> {
  let mut seen = std::collections::HashSet::new();
  per_type
    .into_iter()
    .flat_map(|t| t.statuses)
    .filter(|s| seen.insert(s.id.clone()))
    .map(Status::from)
    .collect()
}

// ============================================================================
// Helpers
// ============================================================================

/// Extract plain text description from Jira's ADF or plain text format
fn extract_description(value: &serde_json::Value) -> Option<String> {
  // API v2
  if let Some(s) = value.as_str() {
    return Some(s.to_string());
  }

  // API v3 ADF document
  if let Some(content) = value.get("content").and_then(|v| v.as_array()) {
    let mut text = String::new();
    extract_adf_text(content, &mut text);
    if !text.is_empty() {
      return Some(text);
    }
  }

  None
}

fn extract_adf_text(content: &[serde_json::Value], output: &mut String) {
  for node in content {
    let Some(node_type) = node.get("type").and_then(|v| v.as_str()) else {
      continue;
    };
    match node_type {
      "text" => {
        if let Some(text) = node.get("text").and_then(|v| v.as_str()) {
          output.push_str(text);
        }
      }
      "hardBreak" => output.push('\n'),
      _ => {
        if let Some(children) = node.get("content").and_then(|v| v.as_array()) {
          extract_adf_text(children, output);
        }
        if node_type == "paragraph" || node_type == "heading" {
          output.push('\n');
        }
      }
    }
  }
}
