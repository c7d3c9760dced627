//! Retry with exponential backoff, and log suppression for polling loops.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Name used in log lines
    pub operation: String,
}

impl RetryPolicy {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            operation: operation.into(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub(crate) fn delay_before(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// The last error of an operation that never succeeded.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy's retries are spent.
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, Exhausted<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retries = 0u32;
    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("{} succeeded after {} retries", policy.operation, retries);
                }
                return Ok(value);
            }
            Err(e) if retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_before(retries);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    policy.operation,
                    retries,
                    policy.max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(Exhausted {
                    error,
                    attempts: retries + 1,
                })
            }
        }
    }
}

/// Counts consecutive failures of a recurring check and tells the caller
/// when to stop logging them.
#[derive(Debug, Default)]
pub struct FailureStreak {
    count: u32,
    log_limit: u32,
}

impl FailureStreak {
    pub fn new(log_limit: u32) -> Self {
        Self {
            count: 0,
            log_limit,
        }
    }

    /// Returns the length of the streak that just ended, if any.
    pub fn record_success(&mut self) -> Option<u32> {
        let ended = (self.count > 0).then_some(self.count);
        self.count = 0;
        ended
    }

    /// Returns whether this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count == self.log_limit + 1 {
            warn!(
                "Suppressing failure logs after {} consecutive failures",
                self.log_limit
            );
        }
        self.count <= self.log_limit
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
