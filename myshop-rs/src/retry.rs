//! Bounded retry with exponential backoff for transient storage calls.
//!
//! Every error is treated as transient. After attempt `i` fails the caller
//! sleeps `base_delay * 2^i` before trying again; the last error is returned
//! unchanged once the attempt budget is spent.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        with_retry(operation, self.max_attempts, self.base_delay).await
    }
}

/// Delay slept after attempt `attempt_index` (zero based) fails.
pub fn backoff_delay(base_delay: Duration, attempt_index: u32) -> Duration {
    let factor = 2_u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
    base_delay.saturating_mul(factor)
}

pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts => {
                warn!(
                    attempt = attempt + 1,
                    attempts,
                    error = %err,
                    "operation failed; retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    attempt = attempt + 1,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
