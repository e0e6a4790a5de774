//! Incremental fetching and local caching engine for GitHub repository
//! statistics.
//!
//! Streams paginated collections (stargazers, releases, watchers) from
//! the rate-limited GitHub API, merges them with a per-repository
//! compressed cache, and publishes partial-progress snapshots that a UI
//! can observe, pause, resume and cancel.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stargaze::{
//!   CachedService, Config, ResourceSubscription, Stargazer, SubscriptionKey,
//! };
//!
//! let config = Config::load(None)?;
//! let token = Config::get_api_token();
//! let service = Arc::new(CachedService::open(
//!   &config, token.as_deref(), "rust-lang", "rust",
//! )?);
//!
//! let subscription = ResourceSubscription::<Stargazer, _, _>::subscribe(
//!   service,
//!   SubscriptionKey::new::<Stargazer>("rust-lang", "rust", None),
//!   false,
//!   &config.stream,
//! );
//!
//! let mut snapshots = subscription.watch();
//! while snapshots.changed().await.is_ok() {
//!   let state = snapshots.borrow();
//!   println!("{} stargazers (loading: {})", state.records.len(), state.loading);
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod stream;

pub use auth::{AuthState, Identity};
pub use cache::{CacheStore, ConfiguredStore, MemoryStore, SqliteStore, TtlConfig};
pub use config::Config;
pub use error::{Error, Result};
pub use github::{
  Actor, CachedService, Cursor, Fetched, GithubApi, GithubClient, Release, Repository,
  ResourceIter, ResourceKind, ResourcePage, ResourceRecord, Stargazer, Watcher,
};
pub use stream::{Phase, ResourceState, ResourceSubscription, SubscriptionKey};
