//! Retry budget and exponential backoff with jitter
//!
//! The same policy drives two loops: re-queueing a failed article and
//! re-opening a session to a server that refused the last connection.

use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior
///
/// # Example
///
/// ```
/// use nntp_poster::RetryConfig;
/// use std::time::Duration;
///
/// let retry = RetryConfig {
///     jitter: false,
///     ..Default::default()
/// };
/// assert_eq!(retry.backoff(1), Duration::from_millis(500));
/// assert_eq!(retry.backoff(2), Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryConfig {
    /// Attempts per article (and consecutive connection failures per server)
    /// before giving up; must be at least 1
    pub max_attempts: u32,
    /// Delay after the first failure in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound of the delay in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier (exponential factor)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Default backoff with a custom attempt budget
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay before the next try after `failures` consecutive failures
    ///
    /// Grows by `backoff_multiplier` per failure, capped at `max_backoff_ms`.
    /// With jitter enabled up to 50% is added on top.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(63) as i32;
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64).max(0.0) as u64;

        let delay_ms = if self.jitter && capped > 0 {
            capped.saturating_add(rand::thread_rng().gen_range(0..=capped / 2))
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }
}
