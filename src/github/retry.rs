//! Retry policy for transient upstream failures.

use std::time::Duration;

use crate::config::StreamConfig;

/// Bounded retries with exponential backoff. Which errors qualify is
/// decided by `Error::is_transient`; 401 in particular never retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Retries after the initial attempt.
  pub max_retries: u32,
  /// Backoff base: delay for retry `n` (1-based) is `2^n * base`.
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  pub fn from_config(config: &StreamConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      base_delay: config.retry_base_delay(),
    }
  }

  /// Delay before retry `attempt` (1-based). With the default base this
  /// is 2s, 4s, 8s.
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    self.base_delay.saturating_mul(1u32 << attempt.min(16))
  }
}
