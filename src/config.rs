use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::proxy::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub jira: JiraConfig,
  pub default_project: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
  pub url: String,
  pub email: String,
}

/// Freshness windows for cached tracker data, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_metadata_ttl")]
  pub metadata_ttl_secs: u64,
  #[serde(default = "default_issue_ttl")]
  pub issue_ttl_secs: u64,
  #[serde(default = "default_search_ttl")]
  pub search_ttl_secs: u64,
}

fn default_metadata_ttl() -> u64 {
  86_400
}

fn default_issue_ttl() -> u64 {
  300
}

fn default_search_ttl() -> u64 {
  120
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      metadata_ttl_secs: default_metadata_ttl(),
      issue_ttl_secs: default_issue_ttl(),
      search_ttl_secs: default_search_ttl(),
    }
  }
}

impl CacheConfig {
  pub fn metadata_ttl(&self) -> Duration {
    Duration::from_secs(self.metadata_ttl_secs)
  }

  pub fn issue_ttl(&self) -> Duration {
    Duration::from_secs(self.issue_ttl_secs)
  }

  pub fn search_ttl(&self) -> Duration {
    Duration::from_secs(self.search_ttl_secs)
  }
}

/// Retry policy for read-only tracker calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_base_delay")]
  pub base_delay_ms: u64,
  #[serde(default = "default_max_delay")]
  pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
  3
}

fn default_base_delay() -> u64 {
  200
}

fn default_max_delay() -> u64 {
  2_000
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      base_delay_ms: default_base_delay(),
      max_delay_ms: default_max_delay(),
    }
  }
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.max_attempts,
      backoff: Backoff::Exponential {
        base: Duration::from_millis(self.base_delay_ms),
        max: Duration::from_millis(self.max_delay_ms),
      },
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trackr.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trackr/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/trackr/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("trackr.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trackr").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    url::Url::parse(&config.jira.url)
      .map_err(|e| eyre!("Invalid jira.url {:?}: {}", config.jira.url, e))?;

    Ok(config)
  }

  /// Get the Jira API token from environment variables.
  ///
  /// Checks TRACKR_JIRA_TOKEN first, then JIRA_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("TRACKR_JIRA_TOKEN")
      .or_else(|_| std::env::var("JIRA_API_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Jira API token not found. Set TRACKR_JIRA_TOKEN or JIRA_API_TOKEN environment variable."
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
jira:
  url: https://example.atlassian.net
  email: dev@example.com
"#;

  #[test]
  fn test_defaults_applied() {
    let config = Config::parse(MINIMAL).unwrap();

    assert_eq!(config.default_project, None);
    assert_eq!(config.cache.metadata_ttl(), Duration::from_secs(86_400));
    assert_eq!(config.retry.policy(), RetryPolicy::default());
  }

  #[test]
  fn test_overrides() {
    let config = Config::parse(
      r#"
jira:
  url: https://jira.internal
  email: dev@example.com
default_project: OPS
cache:
  issue_ttl_secs: 10
retry:
  max_attempts: 5
  base_delay_ms: 50
"#,
    )
    .unwrap();

    assert_eq!(config.default_project.as_deref(), Some("OPS"));
    assert_eq!(config.cache.issue_ttl(), Duration::from_secs(10));
    assert_eq!(config.cache.search_ttl(), Duration::from_secs(120));
    assert_eq!(config.retry.policy().max_attempts, 5);
    assert_eq!(
      config.retry.policy().backoff.delay(1),
      Duration::from_millis(50)
    );
  }

  #[test]
  fn test_invalid_url_rejected() {
    let err = Config::parse("jira:\n  url: not a url\n  email: a@b.c\n").unwrap_err();
    assert!(err.to_string().contains("Invalid jira.url"));
  }

  #[test]
  fn test_missing_explicit_file() {
    let err = Config::load(Some(Path::new("/nonexistent/trackr.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, MINIMAL).unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.jira.email, "dev@example.com");
  }
}
