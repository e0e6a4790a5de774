//! Caching decorator over the upstream API, and the paginated resource
//! iterator it hands out.
//!
//! The service owns the two cross-cutting controls every upstream call
//! goes through: a shared admission limiter bounding concurrent requests
//! across all iterators, and the retry policy for transient failures.
//! Cache failures never propagate; a broken or stale entry is simply a
//! miss and the page is fetched fresh.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::client::{GithubApi, GithubClient};
use super::retry::RetryPolicy;
use super::types::{
  Actor, Cursor, Repository, ResourcePage, ResourceRecord, StoredPage,
};
use crate::cache::{keys, CacheStore, ConfiguredStore, MemoryStore, TtlConfig};
use crate::config::{Config, StreamConfig};
use crate::error::{Error, Result};

/// A read-through result, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub value: T,
  pub from_cache: bool,
}

/// Upstream service with transparent per-resource caching, scoped to one
/// repository namespace.
pub struct CachedService<A: GithubApi, S: CacheStore> {
  api: A,
  store: S,
  limiter: Arc<Semaphore>,
  retry: RetryPolicy,
}

impl CachedService<GithubClient, ConfiguredStore> {
  /// Build the default stack for one repository: REST client plus the
  /// store the cache configuration selects — on-disk under the
  /// repository's namespace, or process-local when caching is disabled.
  pub fn open(config: &Config, token: Option<&str>, owner: &str, name: &str) -> Result<Self> {
    let api = GithubClient::new(&config.github, token, config.stream.page_size)?;
    let store = ConfiguredStore::open(&keys::namespace(owner, name), &config.cache)?;
    Ok(Self::new(api, store, &config.stream))
  }
}

impl<A: GithubApi> CachedService<A, MemoryStore> {
  /// Service with a process-local cache only, for when persistence is
  /// disabled.
  pub fn in_memory(api: A, config: &Config) -> Self {
    let store = MemoryStore::new(TtlConfig::from_config(&config.cache));
    Self::new(api, store, &config.stream)
  }
}

impl<A: GithubApi, S: CacheStore> CachedService<A, S> {
  pub fn new(api: A, store: S, config: &StreamConfig) -> Self {
    Self {
      api,
      store,
      limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
      retry: RetryPolicy::from_config(config),
    }
  }

  /// Repository metadata, read-through: a fresh cached copy short-circuits
  /// the upstream entirely.
  pub async fn repository(&self, owner: &str, name: &str) -> Result<Fetched<Repository>> {
    let key = keys::repository_key(owner, name);

    if let Some(repo) = self.cache_get::<Repository>(&key) {
      tracing::debug!(%key, "repository metadata served from cache");
      return Ok(Fetched {
        value: repo,
        from_cache: true,
      });
    }

    let repo = self.with_retry(|| self.api.repository(owner, name)).await?;
    self.cache_put(&key, &repo);

    Ok(Fetched {
      value: repo,
      from_cache: false,
    })
  }

  /// The authenticated identity. Never cached: it must reflect the token
  /// the client currently holds.
  pub async fn viewer(&self) -> Result<Actor> {
    self.with_retry(|| self.api.viewer()).await
  }

  /// Lazy page sequence for one resource kind, starting at `cursor`
  /// (`None` for the beginning of the collection).
  pub fn resources<T: ResourceRecord>(
    self: &Arc<Self>,
    repo: &Repository,
    cursor: Option<Cursor>,
  ) -> ResourceIter<T, A, S> {
    ResourceIter {
      service: Arc::clone(self),
      repo: repo.clone(),
      cursor,
      done: false,
      _record: PhantomData,
    }
  }

  /// Evict everything cached for this repository.
  pub fn clear_cache(&self) -> Result<()> {
    self.store.clear()
  }

  async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let mut attempt = 0u32;
    loop {
      let result = {
        // Permit held for the request only: a stream backing off must
        // not occupy an admission slot while it sleeps
        let _permit = self
          .limiter
          .acquire()
          .await
          .map_err(|_| Error::Other("admission limiter closed".to_string()))?;
        op().await
      };

      match result {
        Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
          attempt += 1;
          let delay = self.retry.delay_for_attempt(attempt);
          tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying transient upstream failure");
          tokio::time::sleep(delay).await;
        }
        other => return other,
      }
    }
  }

  fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    match self.store.get(key) {
      Ok(value) => value,
      Err(e) => {
        tracing::debug!(%key, "cache read failed, treating as miss: {e}");
        None
      }
    }
  }

  fn cache_put<T: Serialize>(&self, key: &str, value: &T) {
    if let Err(e) = self.store.set(key, value) {
      tracing::warn!(%key, "cache write failed: {e}");
    }
  }
}

/// Lazy per-page puller for one resource stream.
///
/// Each `next_page` call consumes exactly one cached or upstream page and
/// advances the cursor; after the terminal page (`has_more = false`) or
/// an error, further calls return `None`. A new iterator can be started
/// from any previously observed cursor, but a single iteration never
/// rewinds.
pub struct ResourceIter<T: ResourceRecord, A: GithubApi, S: CacheStore> {
  service: Arc<CachedService<A, S>>,
  repo: Repository,
  cursor: Option<Cursor>,
  done: bool,
  _record: PhantomData<fn() -> T>,
}

impl<T: ResourceRecord, A: GithubApi, S: CacheStore> ResourceIter<T, A, S> {
  /// The cursor the next pull will request.
  pub fn cursor(&self) -> Option<&Cursor> {
    self.cursor.as_ref()
  }

  pub async fn next_page(&mut self) -> Option<Result<ResourcePage<T>>> {
    if self.done {
      return None;
    }

    let key = keys::page_key(T::KIND, self.cursor.as_ref());

    // Typed decode doubles as schema validation: a page cached under an
    // older shape fails decode and is refetched instead of surfacing
    if let Some(stored) = self.service.cache_get::<StoredPage<T>>(&key) {
      tracing::debug!(kind = %T::KIND, %key, "page served from cache");
      let page = ResourcePage {
        data: stored.data,
        cursor: stored.cursor,
        has_more: stored.has_more,
        cached: true,
      };
      self.advance(&page);
      return Some(Ok(page));
    }

    let raw = match self
      .service
      .with_retry(|| self.service.api.fetch_page(T::KIND, &self.repo, self.cursor.as_ref()))
      .await
    {
      Ok(raw) => raw,
      Err(e) => {
        self.done = true;
        return Some(Err(e));
      }
    };

    let data: Vec<T> = match raw.rows.into_iter().map(T::decode_row).collect() {
      Ok(data) => data,
      Err(e) => {
        self.done = true;
        return Some(Err(Error::Decode(e)));
      }
    };

    self.service.cache_put(
      &key,
      &StoredPage {
        data: data.clone(),
        cursor: raw.cursor.clone(),
        has_more: raw.has_more,
      },
    );

    let page = ResourcePage {
      data,
      cursor: raw.cursor,
      has_more: raw.has_more,
      cached: false,
    };
    self.advance(&page);
    Some(Ok(page))
  }

  fn advance(&mut self, page: &ResourcePage<T>) {
    // A page claiming more data without a continuation token would pull
    // itself forever; treat it as terminal
    self.done = !page.has_more || page.cursor.is_none();
    self.cursor = page.cursor.clone();
  }

  /// Adapt to a `futures::Stream` of pages.
  pub fn into_stream(self) -> impl futures::Stream<Item = Result<ResourcePage<T>>> {
    futures::stream::unfold(self, |mut iter| async move {
      iter.next_page().await.map(|page| (page, iter))
    })
  }
}
