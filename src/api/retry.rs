//! Retry policy for rate-limited API requests.

use crate::error::ApiError;
use std::time::Duration;

/// Bounded retry policy used by [`super::Provider`].
///
/// Only HTTP 429 triggers a retry; every other failure is returned to the
/// caller on the first attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Number of retries after the initial request.
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubled per attempt).
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
    /// Decide whether another attempt should be scheduled.
    pub fn should_retry(&self, err: &ApiError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        err.status_code() == Some(429)
    }

    /// Compute the delay before the next attempt.
    ///
    /// A parseable `Retry-After` header wins; otherwise exponential backoff
    /// from `base_delay` with `attempt` counted from zero.
    pub fn delay_for(&self, attempt: u32, err: &ApiError) -> Duration {
        if let Some(seconds) = err.retry_after_secs() {
            return Duration::from_secs(seconds);
        }
        let pow = 2u32.saturating_pow(attempt);
        let millis = self.base_delay.as_millis().saturating_mul(pow as u128);
        Duration::from_millis(millis.min(u64::MAX as u128) as u64)
    }
}
