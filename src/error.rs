//! Error taxonomy for upstream fetches and cache persistence.
//!
//! Upstream failures propagate through the iterator to the consumer state
//! machine; cache failures are absorbed at the call site (a broken cache
//! degrades to a fresh fetch, never to a hard error).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  /// 401 from upstream. Never retried, suppressed from the visible error
  /// slot by the streaming consumer.
  #[error("authentication required: invalid or missing token")]
  Unauthorized,

  /// 403/429 from upstream (secondary rate limit). Retried with backoff.
  #[error("rate limited by upstream{}", reset_suffix(.reset_at))]
  RateLimited { reset_at: Option<String> },

  #[error("resource not found: {0}")]
  NotFound(String),

  /// Transport-level failure (DNS, connect, timeout). Retried with backoff.
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),

  /// Any other upstream status. Surfaced verbatim.
  #[error("upstream API error ({status}): {message}")]
  Api { status: u16, message: String },

  #[error("cache database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("configuration error: {0}")]
  Config(String),

  #[error("{0}")]
  Other(String),
}

fn reset_suffix(reset_at: &Option<String>) -> String {
  match reset_at {
    // The header carries a unix timestamp; pass it through untouched
    Some(epoch) => format!(", resets at {epoch}"),
    None => String::new(),
  }
}

impl Error {
  /// Whether a retry with backoff may succeed. 401 is deliberately not
  /// transient: it signals missing credentials, not a flaky upstream.
  pub fn is_transient(&self) -> bool {
    matches!(self, Error::Network(_) | Error::RateLimited { .. })
  }

  pub fn is_unauthorized(&self) -> bool {
    matches!(self, Error::Unauthorized)
  }
}

pub type Result<T> = std::result::Result<T, Error>;
