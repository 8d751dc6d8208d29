//! Bounded retry with backoff for external calls
//!
//! Only transient service errors are retried; validation and not-found
//! errors propagate immediately so the pipeline can fail fast.

use crate::provision::ProvisionError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Retry budget for one external call site
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,
    /// Delay before the first retry; doubles per attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy used in tests to avoid real sleeps
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(0),
        }
    }
}

/// Run an operation with bounded retries on transient errors
pub async fn with_retries<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut call: F,
) -> Result<T, ProvisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProvisionError>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "{} failed with transient error (attempt {}/{}): {}",
                    operation, attempt, policy.max_attempts, err
                );
                sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
