use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub github: GithubConfig,
  pub cache: CacheConfig,
  pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
  /// Base URL of the GitHub REST API.
  pub api_url: String,
}

impl Default for GithubConfig {
  fn default() -> Self {
    Self {
      api_url: "https://api.github.com".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Directory holding the per-repository cache databases.
  /// Defaults to $XDG_DATA_HOME/stargaze.
  pub dir: Option<PathBuf>,
  pub enabled: bool,
  /// TTL for cached repository metadata, in days.
  pub repository_ttl_days: f64,
  /// TTL for cached paginated collections, in days.
  pub resource_ttl_days: f64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      dir: None,
      enabled: true,
      repository_ttl_days: 1.0,
      resource_ttl_days: 7.0,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
  /// Upstream admission limit shared across all resource iterators.
  pub max_concurrent_requests: usize,
  /// Retries for 403s and network errors before surfacing the failure.
  pub max_retries: u32,
  /// Base for the exponential backoff: delay = 2^attempt * base.
  pub retry_base_delay_ms: u64,
  /// Snapshot cadence when replaying cached history: a page is published
  /// once the buffer grows past ceil(expected_total / publish_batches).
  pub publish_batches: u32,
  /// Records requested per upstream page.
  pub page_size: u32,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      max_concurrent_requests: 2,
      max_retries: 3,
      retry_base_delay_ms: 1000,
      publish_batches: 5,
      page_size: 100,
    }
  }
}

impl StreamConfig {
  pub fn retry_base_delay(&self) -> Duration {
    Duration::from_millis(self.retry_base_delay_ms)
  }
}

impl Config {
  /// Load configuration from file, falling back to defaults when no file
  /// exists.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stargaze.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stargaze/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("stargaze.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stargaze").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::Config(format!(
        "failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      Error::Config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Ok(config)
  }

  /// Get the GitHub API token from environment variables.
  ///
  /// Checks STARGAZE_GITHUB_TOKEN first, then GITHUB_TOKEN as fallback.
  /// An absent token is not an error: unauthenticated calls work until the
  /// upstream answers 401.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STARGAZE_GITHUB_TOKEN")
      .or_else(|_| std::env::var("GITHUB_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_upstream_limits() {
    let config = Config::default();
    assert_eq!(config.stream.max_concurrent_requests, 2);
    assert_eq!(config.stream.max_retries, 3);
    assert_eq!(config.stream.publish_batches, 5);
    assert_eq!(config.cache.repository_ttl_days, 1.0);
    assert_eq!(config.cache.resource_ttl_days, 7.0);
    assert!(config.cache.enabled);
  }

  #[test]
  fn parses_partial_yaml() {
    let config: Config =
      serde_yaml::from_str("stream:\n  publish_batches: 10\ncache:\n  enabled: false\n").unwrap();
    assert_eq!(config.stream.publish_batches, 10);
    assert!(!config.cache.enabled);
    // Unspecified sections keep their defaults
    assert_eq!(config.stream.max_retries, 3);
    assert_eq!(config.github.api_url, "https://api.github.com");
  }

  #[test]
  fn missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/stargaze.yaml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }
}
