//! Process-wide authentication state.
//!
//! A plain mutable store with explicit `sign_in`/`sign_out` mutators and
//! an explicit subscriber list. Subscriptions key on the viewer's login,
//! so whoever owns a `ResourceSubscription` registers a subscriber here
//! and restarts the stream when the identity changes.

use std::sync::{Arc, Mutex, RwLock};

use crate::error::Result;
use crate::github::client::GithubApi;
use crate::github::types::Actor;

/// An authenticated viewer and the token that proved it.
#[derive(Clone)]
pub struct Identity {
  pub actor: Actor,
  pub token: String,
}

impl std::fmt::Debug for Identity {
  // Keep the token out of logs
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Identity")
      .field("login", &self.actor.login)
      .finish_non_exhaustive()
  }
}

type Subscriber = Arc<dyn Fn(Option<&Identity>) + Send + Sync>;

#[derive(Default)]
pub struct AuthState {
  current: RwLock<Option<Identity>>,
  subscribers: Mutex<Vec<Subscriber>>,
}

impl AuthState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> Option<Identity> {
    self
      .current
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clone()
  }

  /// Login of the signed-in viewer, the piece that goes into
  /// subscription keys.
  pub fn viewer_login(&self) -> Option<String> {
    self.current().map(|id| id.actor.login)
  }

  pub fn sign_in(&self, identity: Identity) {
    tracing::debug!(login = %identity.actor.login, "viewer signed in");
    *self
      .current
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(identity);
    self.notify();
  }

  pub fn sign_out(&self) {
    *self
      .current
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    self.notify();
  }

  /// Resolve the identity behind `token` and sign it in. `api` must be a
  /// client already carrying that token; the lookup is deliberately
  /// uncached so the identity always reflects the token.
  pub async fn sign_in_with_token<A: GithubApi>(&self, api: &A, token: String) -> Result<Actor> {
    let actor = api.viewer().await?;
    self.sign_in(Identity {
      actor: actor.clone(),
      token,
    });
    Ok(actor)
  }

  /// Register a subscriber called on every sign-in and sign-out, for the
  /// lifetime of this state.
  pub fn subscribe(&self, subscriber: impl Fn(Option<&Identity>) + Send + Sync + 'static) {
    self
      .subscribers
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .push(Arc::new(subscriber));
  }

  fn notify(&self) {
    let current = self.current();
    // Snapshot the list and release the lock before calling out, so a
    // subscriber may itself subscribe or change the identity
    let subscribers: Vec<Subscriber> = self
      .subscribers
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clone();
    for subscriber in &subscribers {
      subscriber(current.as_ref());
    }
  }
}
