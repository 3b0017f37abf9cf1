//! Retry policy for page fetches
//!
//! The policy decides how many attempts a page gets and how long to wait
//! between them. Delays grow linearly with the attempt number, and timeouts
//! back off from a longer base than other failures.

use crate::config::RetryConfig;
use crate::crawler::fetcher::FetchError;
use std::time::Duration;

/// Attempt budget and backoff schedule for fetching a single page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Base delay after generic failures
    pub base_delay: Duration,

    /// Base delay after timeouts
    pub timeout_base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy from explicit values
    pub fn new(max_attempts: u32, base_delay: Duration, timeout_base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            timeout_base_delay,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Returns true if another attempt is allowed after `attempt` failed
    ///
    /// `attempt` is 1-based. Every fetch failure kind is retried the same way.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, error: &FetchError) -> Duration {
        let base = match error {
            FetchError::Timeout { .. } => self.timeout_base_delay,
            _ => self.base_delay,
        };
        base.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.timeout_base_delay_ms),
        )
    }
}
