use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::jira::api_types::{
  flatten_statuses, reserialize, ApiIssue, ApiIssueFields, ApiIssueType, ApiIssueTypeStatuses,
  ApiProject, ApiTransitionsResponse,
};
use crate::jira::types::{Board, Issue, IssueSummary, IssueType, Project, Status, Transition};

/// Raw tracker operations, one network round trip (or page stream) each.
///
/// Nothing here caches or retries; that is layered on by
/// [`Metadata`](super::Metadata) and the repository decorators.
#[async_trait]
pub trait TrackerBackend: Send + Sync {
  async fn search(&self, jql: &str) -> Result<Vec<IssueSummary>>;
  async fn issue(&self, key: &str) -> Result<Issue>;
  async fn boards(&self, project: Option<&str>) -> Result<Vec<Board>>;
  async fn projects(&self) -> Result<Vec<Project>>;
  async fn issue_types(&self) -> Result<Vec<IssueType>>;
  async fn statuses(&self, project: &str) -> Result<Vec<Status>>;
  async fn transitions(&self, key: &str) -> Result<Vec<Transition>>;
  async fn transition(&self, key: &str, transition_id: &str) -> Result<()>;
}

/// Jira API client wrapper
#[derive(Clone)]
pub struct JiraClient {
  client: gouqi::r#async::Jira,
}

impl JiraClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let credentials = gouqi::Credentials::Basic(config.jira.email.clone(), token);

    let client = gouqi::r#async::Jira::new(&config.jira.url, credentials)
      .map_err(|e| eyre!("Failed to create Jira client: {}", e))?;

    debug!(url = %config.jira.url, "jira client created");
    Ok(Self { client })
  }
}

#[async_trait]
impl TrackerBackend for JiraClient {
  async fn search(&self, jql: &str) -> Result<Vec<IssueSummary>> {
    use futures::{StreamExt, TryStreamExt};

    let search = self.client.search();
    let options = gouqi::SearchOptions::default();

    let stream = search
      .stream(jql, &options)
      .await
      .map_err(|e| eyre!("Failed to search issues: {}", e))?;

    let issues: Vec<IssueSummary> = stream
      .map(|issue| {
        let fields: ApiIssueFields = reserialize(&issue.fields)?;
        Ok(
          ApiIssue {
            key: issue.key,
            fields,
          }
          .into_summary(),
        )
      })
      .try_collect()
      .await
      .map_err(|e: serde_json::Error| eyre!("Failed to parse issue: {}", e))?;

    Ok(issues)
  }

  async fn issue(&self, key: &str) -> Result<Issue> {
    let issues = self.client.issues();

    let issue = issues
      .get(key)
      .await
      .map_err(|e| eyre!("Failed to get issue {}: {}", key, e))?;

    let fields: ApiIssueFields =
      reserialize(&issue.fields).map_err(|e| eyre!("Failed to parse issue {}: {}", key, e))?;

    Ok(
      ApiIssue {
        key: issue.key,
        fields,
      }
      .into_full(),
    )
  }

  async fn boards(&self, project: Option<&str>) -> Result<Vec<Board>> {
    use futures::StreamExt;

    let boards_api = self.client.boards();
    let options = match project {
      Some(p) => gouqi::SearchOptions::builder().project_key_or_id(p).build(),
      None => gouqi::SearchOptions::default(),
    };

    let stream = boards_api
      .stream(&options)
      .await
      .map_err(|e| eyre!("Failed to get boards: {}", e))?;

    let boards: Vec<Board> = stream
      .filter_map(|result| async move { result.ok() })
      .map(|board| Board {
        id: board.id,
        name: board.name,
        board_type: board.type_name,
      })
      .collect()
      .await;

    Ok(boards)
  }

  async fn projects(&self) -> Result<Vec<Project>> {
    let response: Vec<ApiProject> = self
      .client
      .get("api", "/project")
      .await
      .map_err(|e| eyre!("Failed to get projects: {}", e))?;

    Ok(response.into_iter().map(Project::from).collect())
  }

  async fn issue_types(&self) -> Result<Vec<IssueType>> {
    let response: Vec<ApiIssueType> = self
      .client
      .get("api", "/issuetype")
      .await
      .map_err(|e| eyre!("Failed to get issue types: {}", e))?;

    Ok(response.into_iter().map(IssueType::from).collect())
  }

  async fn statuses(&self, project: &str) -> Result<Vec<Status>> {
    let endpoint = format!("/project/{}/statuses", project);

    let response: Vec<ApiIssueTypeStatuses> = self
      .client
      .get("api", &endpoint)
      .await
      .map_err(|e| eyre!("Failed to get statuses for {}: {}", project, e))?;

    Ok(flatten_statuses(response))
  }

  async fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
    let endpoint = format!("/issue/{}/transitions", key);

    let response: ApiTransitionsResponse = self
      .client
      .get("api", &endpoint)
      .await
      .map_err(|e| eyre!("Failed to get transitions: {}", e))?;

    Ok(
      response
        .transitions
        .into_iter()
        .map(Transition::from)
        .collect(),
    )
  }

  async fn transition(&self, key: &str, transition_id: &str) -> Result<()> {
    let endpoint = format!("/issue/{}/transitions", key);
    let body = serde_json::json!({
      "transition": {
        "id": transition_id
      }
    });

    self
      .client
      .post::<Value, _>("api", &endpoint, body)
      .await
      .map_err(|e| eyre!("Failed to execute transition: {}", e))?;

    Ok(())
  }
}
