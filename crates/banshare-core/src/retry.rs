//! Retry/backoff settings shared by the registry store and the HTTP client.

use std::time::Duration;

/// Retry configuration for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Whether to retry on rate limit errors
    pub retry_on_rate_limit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            retry_on_rate_limit: true,
        }
    }

    /// A configuration that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self::new().max_retries(0)
    }

    /// Set maximum retries
    #[must_use]
    pub const fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set initial backoff duration
    #[must_use]
    pub const fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    /// Set maximum backoff duration
    #[must_use]
    pub const fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Set whether rate-limit responses are retried
    #[must_use]
    pub const fn retry_on_rate_limit(mut self, retry: bool) -> Self {
        self.retry_on_rate_limit = retry;
        self
    }

    /// Calculate backoff for a given attempt (0-based), doubling each time
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let initial = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        let backoff = 2u64
            .checked_pow(attempt)
            .and_then(|factor| initial.checked_mul(factor))
            .unwrap_or(max);
        Duration::from_millis(backoff.min(max))
    }
}
