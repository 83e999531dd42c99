use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Bounded exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles on every further attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Run the operation exactly once
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(2_u32.pow(exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Retry `operation` while `should_retry` accepts the error and attempts remain.
pub async fn retry_async<F, Fut, T, E, P>(
    mut operation: F,
    policy: RetryPolicy,
    operation_name: &str,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!("Operation '{}' succeeded after {} attempts", operation_name, attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= max_attempts || !should_retry(&error) {
                    error!("Operation '{}' failed after {} attempts: {}", operation_name, attempts, error);
                    return Err(error);
                }

                warn!("Operation '{}' failed (attempt {}): {}, retrying...", operation_name, attempts, error);
                tokio::time::sleep(policy.delay_for(attempts)).await;
            }
        }
    }
}
