//! Upstream API client, caching decorator and paginated iteration.

pub mod cached;
pub mod client;
pub mod retry;
pub mod types;

pub use cached::{CachedService, Fetched, ResourceIter};
pub use client::{GithubApi, GithubClient};
pub use types::{
  Actor, Cursor, RawPage, Release, Repository, ResourceKind, ResourcePage, ResourceRecord,
  Stargazer, Watcher,
};

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted upstream for service and consumer tests.

  use async_trait::async_trait;
  use serde::Serialize;
  use serde_json::Value;
  use std::collections::{HashMap, VecDeque};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  use super::types::{Actor, Cursor, RawPage, Repository, ResourceKind};
  use super::GithubApi;
  use crate::error::{Error, Result};

  /// Route engine logs through the test harness, filtered by RUST_LOG.
  /// Safe to call from every test; only the first call installs.
  pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  }

  pub(crate) enum MockResponse {
    Page(RawPage),
    Status(u16),
  }

  /// Fake upstream keyed by (kind, cursor). Multiple responses can be
  /// queued at the same cursor so retry sequences (403, 403, 200) can be
  /// scripted.
  pub(crate) struct MockApi {
    pub repo: Repository,
    pub viewer: Option<Actor>,
    scripts: Mutex<HashMap<(ResourceKind, Option<String>), VecDeque<MockResponse>>>,
    pub fetch_calls: AtomicUsize,
    pub repo_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fetch_delay: Option<Duration>,
  }

  pub(crate) fn actor(login: &str) -> Actor {
    Actor {
      id: Some(format!("U_{login}")),
      login: login.to_string(),
      avatar_url: None,
      name: None,
      company: None,
      location: None,
      created_at: None,
      followers_count: None,
      following_count: None,
    }
  }

  pub(crate) fn repo(stargazers_count: u64) -> Repository {
    Repository {
      id: "R_mock".to_string(),
      name: "widget".to_string(),
      name_with_owner: "acme/widget".to_string(),
      owner: actor("acme"),
      description: None,
      language: Some("Rust".to_string()),
      created_at: chrono::Utc::now(),
      stargazers_count,
      subscribers_count: 10,
      forks_count: 3,
      releases_count: None,
    }
  }

  impl MockApi {
    pub fn new(repo: Repository) -> Self {
      Self {
        repo,
        viewer: Some(actor("viewer")),
        scripts: Mutex::new(HashMap::new()),
        fetch_calls: AtomicUsize::new(0),
        repo_calls: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        fetch_delay: None,
      }
    }

    pub fn push(&self, kind: ResourceKind, cursor: Option<&str>, response: MockResponse) {
      self
        .scripts
        .lock()
        .unwrap()
        .entry((kind, cursor.map(String::from)))
        .or_default()
        .push_back(response);
    }

    /// Script a full collection as consecutive pages. Page N (1-based)
    /// is served at cursor `None` for N=1 and `"N"` otherwise; every
    /// page but the last links to cursor `"N+1"`.
    pub fn script_pages<T: Serialize>(&self, kind: ResourceKind, pages: Vec<Vec<T>>) {
      let count = pages.len();
      for (i, rows) in pages.into_iter().enumerate() {
        let cursor_key = if i == 0 { None } else { Some((i + 1).to_string()) };
        let last = i + 1 == count;
        let page = RawPage {
          rows: rows
            .into_iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect::<Vec<Value>>(),
          cursor: (!last).then(|| Cursor::from((i + 2).to_string())),
          has_more: !last,
        };
        self.push(kind, cursor_key.as_deref(), MockResponse::Page(page));
      }
    }

    pub fn fetch_count(&self) -> usize {
      self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn max_observed_in_flight(&self) -> usize {
      self.max_in_flight.load(Ordering::SeqCst)
    }
  }

  fn status_error(status: u16) -> Error {
    match status {
      401 => Error::Unauthorized,
      403 | 429 => Error::RateLimited { reset_at: None },
      404 => Error::NotFound("scripted".to_string()),
      s => Error::Api {
        status: s,
        message: "scripted failure".to_string(),
      },
    }
  }

  #[async_trait]
  impl GithubApi for Arc<MockApi> {
    async fn repository(&self, _owner: &str, _name: &str) -> Result<Repository> {
      self.repo_calls.fetch_add(1, Ordering::SeqCst);
      Ok(self.repo.clone())
    }

    async fn viewer(&self) -> Result<Actor> {
      self.viewer.clone().ok_or(Error::Unauthorized)
    }

    async fn fetch_page(
      &self,
      kind: ResourceKind,
      _repo: &Repository,
      cursor: Option<&Cursor>,
    ) -> Result<RawPage> {
      let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(n, Ordering::SeqCst);

      if let Some(delay) = self.fetch_delay {
        tokio::time::sleep(delay).await;
      }

      let response = self
        .scripts
        .lock()
        .unwrap()
        .get_mut(&(kind, cursor.map(|c| c.as_str().to_string())))
        .and_then(VecDeque::pop_front);

      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      self.fetch_calls.fetch_add(1, Ordering::SeqCst);

      match response {
        Some(MockResponse::Page(page)) => Ok(page),
        Some(MockResponse::Status(status)) => Err(status_error(status)),
        None => Err(Error::Api {
          status: 599,
          message: format!("unscripted request: {kind} at {cursor:?}"),
        }),
      }
    }
  }
}
