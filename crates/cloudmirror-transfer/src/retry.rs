//! Bounded exponential backoff
//!
//! Transient failures are retried in a loop with an attempt counter and a
//! hard ceiling. The ceiling is configuration, never a hidden constant.

use std::future::Future;
use std::time::Duration;

use cloudmirror_core::ports::{BackendError, BackendResult};
use tracing::{info, warn};

use crate::{Result, TransferError};

/// Retry budget and backoff schedule for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    /// Wait at least as long as a throttling backend asks
    honor_retry_after: bool,
}

impl RetryPolicy {
    /// `max_attempts` counts retries after the first try
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            honor_retry_after: true,
        }
    }

    /// Retries without sleeping, ignoring backend retry-after hints
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            honor_retry_after: false,
            ..Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true if retry number `attempt` (1-based) is within budget
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before retry number `attempt`: `base * 2^(attempt-1)`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retrying after `err`: the backoff, stretched to any
    /// retry-after the backend requested
    pub fn delay_after(&self, attempt: u32, err: &BackendError) -> Duration {
        let backoff = self.delay_for(attempt);
        match err.retry_after() {
            Some(hint) if self.honor_retry_after => backoff.max(hint),
            _ => backoff,
        }
    }

    /// Sleeps before retry number `attempt` of an operation that failed with `err`
    pub async fn backoff(&self, attempt: u32, err: &BackendError) {
        let delay = self.delay_after(attempt, err);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Runs a single-request backend operation under the retry policy
///
/// Only [`BackendError::Transient`](cloudmirror_core::ports::BackendError::Transient)
/// is retried. Anything else is mapped onto `path` and returned at once.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    path: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(path, operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() => {
                attempt += 1;
                if !policy.allows(attempt) {
                    warn!(path, operation, attempt, error = %err, "Retry budget exhausted");
                    return Err(TransferError::RetryExhausted {
                        path: path.to_string(),
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
                warn!(
                    path,
                    operation,
                    attempt,
                    delay_ms = policy.delay_after(attempt, &err).as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                policy.backoff(attempt, &err).await;
            }
            Err(err) => return Err(TransferError::from_backend(path, err)),
        }
    }
}
