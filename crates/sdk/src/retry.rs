//! Retry policy for read queries.

use std::{future::Future, time::Duration};

use tracing::debug;

use crate::error::{ApiError, TebexError, classify};

/// Exponential backoff for reads. Mutations never retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy making at most `max_attempts` attempts.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Single attempt, no retry.
    #[must_use]
    pub const fn never() -> Self {
        Self::new(1, 0, 0)
    }

    /// Attempts made before giving up.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry following attempt `attempt` (zero based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);

        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// Run `operation`, retrying classified errors that are retryable.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the last attempt.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, TebexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => classify(error),
            };

            attempt += 1;

            if !error.is_retryable() || attempt >= self.max_attempts.max(1) {
                return Err(error);
            }

            let delay = self.delay_for_attempt(attempt - 1);

            debug!(attempt, ?delay, code = %error.code, "retrying query");

            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500, 30_000)
    }
}
