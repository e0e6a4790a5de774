//! Subscription lifecycle: cancel-and-restart keyed by a composite
//! identity, plus pause/resume.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::consumer;
use super::state::{Phase, ResourceState};
use crate::cache::CacheStore;
use crate::config::StreamConfig;
use crate::github::cached::CachedService;
use crate::github::client::GithubApi;
use crate::github::types::{ResourceKind, ResourceRecord};

/// Identity of one subscription. Any change to it invalidates the
/// accumulated state: a different repository or resource kind is a
/// different collection, and a different viewer may see different data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
  pub owner: String,
  pub name: String,
  pub kind: ResourceKind,
  /// Login of the authenticated viewer, if any.
  pub viewer: Option<String>,
}

impl SubscriptionKey {
  pub fn new<T: ResourceRecord>(owner: &str, name: &str, viewer: Option<&str>) -> Self {
    Self {
      owner: owner.to_string(),
      name: name.to_string(),
      kind: T::KIND,
      viewer: viewer.map(String::from),
    }
  }
}

struct Inner<A: GithubApi, S: CacheStore> {
  service: Arc<CachedService<A, S>>,
  key: SubscriptionKey,
  cancel: CancellationToken,
  paused: bool,
}

/// One live resource subscription.
///
/// Observers read throttled snapshots from `watch()`; the driver task
/// behind it is torn down and restarted whenever the subscription key
/// changes, and dropped state never leaks across keys.
pub struct ResourceSubscription<T: ResourceRecord, A: GithubApi, S: CacheStore> {
  tx: watch::Sender<ResourceState<T>>,
  inner: Mutex<Inner<A, S>>,
  publish_batches: u32,
}

impl<T: ResourceRecord, A: GithubApi, S: CacheStore> ResourceSubscription<T, A, S> {
  /// Activate a subscription. A paused subscription stays `Idle` and
  /// pulls nothing until resumed.
  pub fn subscribe(
    service: Arc<CachedService<A, S>>,
    key: SubscriptionKey,
    paused: bool,
    config: &StreamConfig,
  ) -> Self {
    let (tx, _rx) = watch::channel(ResourceState::default());
    let subscription = Self {
      tx,
      inner: Mutex::new(Inner {
        service,
        key,
        cancel: CancellationToken::new(),
        paused,
      }),
      publish_batches: config.publish_batches,
    };

    if !paused {
      subscription.spawn_driver(&mut subscription.lock());
    }
    subscription
  }

  /// Subscribe to state snapshots.
  pub fn watch(&self) -> watch::Receiver<ResourceState<T>> {
    self.tx.subscribe()
  }

  /// The current snapshot.
  pub fn state(&self) -> ResourceState<T> {
    self.tx.borrow().clone()
  }

  pub fn key(&self) -> SubscriptionKey {
    self.lock().key.clone()
  }

  /// Stop pulling further pages. Published records stay visible and the
  /// cursor is retained for `resume`.
  pub fn pause(&self) {
    let mut inner = self.lock();
    if inner.paused {
      return;
    }
    inner.paused = true;
    inner.cancel.cancel();

    self.tx.send_modify(|state| {
      state.loading = false;
      state.phase = Phase::Paused;
    });
  }

  /// Continue a paused subscription from the last published cursor.
  pub fn resume(&self) {
    let mut inner = self.lock();
    if !inner.paused {
      return;
    }
    inner.paused = false;
    self.spawn_driver(&mut inner);
  }

  /// Re-derive the subscription for a new key (repository, kind or
  /// viewer changed): the previous driver is cancelled, accumulated
  /// state is discarded, and a fresh stream starts against `service`.
  pub fn restart(&self, service: Arc<CachedService<A, S>>, key: SubscriptionKey) {
    let mut inner = self.lock();
    inner.cancel.cancel();
    inner.service = service;
    inner.key = key;

    self.tx.send_replace(ResourceState::default());
    if !inner.paused {
      self.spawn_driver(&mut inner);
    }
  }

  /// Abort without the possibility of resuming; used on teardown.
  pub fn cancel(&self) {
    self.lock().cancel.cancel();
  }

  fn spawn_driver(&self, inner: &mut MutexGuard<'_, Inner<A, S>>) {
    // Tear down the previous token before arming a new one
    inner.cancel.cancel();
    inner.cancel = CancellationToken::new();

    let service = Arc::clone(&inner.service);
    let owner = inner.key.owner.clone();
    let name = inner.key.name.clone();
    let publish_batches = self.publish_batches;
    let tx = self.tx.clone();
    let cancel = inner.cancel.clone();

    tokio::spawn(consumer::drive::<T, A, S>(
      service,
      owner,
      name,
      publish_batches,
      tx,
      cancel,
    ));
  }

  fn lock(&self) -> MutexGuard<'_, Inner<A, S>> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl<T: ResourceRecord, A: GithubApi, S: CacheStore> Drop for ResourceSubscription<T, A, S> {
  fn drop(&mut self) {
    self.cancel();
  }
}
