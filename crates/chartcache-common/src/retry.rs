//! Bounded retry and timeout guards.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retry policy. Delays double from `initial_delay` up to `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Short retries for local store writes. Always at least one attempt.
    pub fn store_writes(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
        }
    }

    /// Delay before a given attempt (1-indexed). The first attempt runs at once.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 2).min(16);
        self.initial_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or `max_attempts` is spent.
///
/// Returns the last error once the attempts are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= config.max_attempts => {
                warn!(attempt, error = %e, "Giving up");
                return Err(e);
            }
            Err(e) => debug!(attempt, error = %e, "Attempt failed"),
        }

        attempt += 1;
        sleep(config.delay_for_attempt(attempt)).await;
    }
}

/// Run an operation with a timeout.
pub async fn with_timeout<T, F, Fut>(
    timeout: Duration,
    operation: F,
) -> Result<T, crate::ChartCacheError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, operation())
        .await
        .map_err(|_| crate::ChartCacheError::Timeout(timeout))
}
