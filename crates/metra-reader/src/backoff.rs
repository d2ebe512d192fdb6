//! Reconnect delay policy.
//!
//! Reconnecting never gives up. The wait before attempt `n + 1`, after `n`
//! consecutive failures, is `min(min_wait × 2^(n-1), max_wait)`.

use metra_core::constants::{DEFAULT_MAX_RECONNECT_WAIT_MS, DEFAULT_MIN_RECONNECT_WAIT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub min_wait_ms: u64,
    /// Upper bound for any delay.
    pub max_wait_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: DEFAULT_MIN_RECONNECT_WAIT_MS,
            max_wait_ms: DEFAULT_MAX_RECONNECT_WAIT_MS,
        }
    }
}

/// Capped exponential backoff.
///
/// ```
/// use metra_reader::{Backoff, BackoffConfig};
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(BackoffConfig { min_wait_ms: 1000, max_wait_ms: 5000 });
/// assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    min_wait: Duration,
    max_wait: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let min_wait = Duration::from_millis(config.min_wait_ms);
        Self {
            min_wait,
            max_wait: Duration::from_millis(config.max_wait_ms).max(min_wait),
            attempts: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let exponent = (self.attempts - 1).min(31);
        self.min_wait
            .checked_mul(1u32 << exponent)
            .map_or(self.max_wait, |delay| delay.min(self.max_wait))
    }

    /// Forget past failures after a successful session.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failures recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
