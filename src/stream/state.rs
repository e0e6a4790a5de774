//! Observable state of one resource subscription.

use std::sync::Arc;

use crate::error::Error;
use crate::github::types::Cursor;

/// Where a subscription is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Not yet activated (or created paused).
  Idle,
  /// Activated; resolving repository metadata before pulling pages.
  Loading,
  /// Pulling pages and publishing snapshots.
  Streaming,
  /// Stopped on request; published state stays visible, resumable.
  Paused,
  /// Stopped on an upstream failure. A 401 lands here too, but with the
  /// error slot left empty: missing credentials are an expected state,
  /// not a fault to display.
  Errored,
  /// The collection was consumed to its terminal page.
  Complete,
}

/// Accumulated snapshot published to observers. Records are append-only
/// for the lifetime of one subscription key; changing the key resets the
/// whole state.
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
  pub records: Vec<T>,
  /// Continuation point of the last published page; a resume picks up
  /// here rather than at the start.
  pub cursor: Option<Cursor>,
  pub has_more: bool,
  /// Whether the most recently published page was replayed from cache.
  pub cached: bool,
  pub loading: bool,
  pub error: Option<Arc<Error>>,
  pub phase: Phase,
}

impl<T> Default for ResourceState<T> {
  fn default() -> Self {
    Self {
      records: Vec::new(),
      cursor: None,
      has_more: true,
      cached: true,
      loading: false,
      error: None,
      phase: Phase::Idle,
    }
  }
}

impl<T> ResourceState<T> {
  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn is_complete(&self) -> bool {
    self.phase == Phase::Complete
  }

  pub fn is_paused(&self) -> bool {
    self.phase == Phase::Paused
  }
}
