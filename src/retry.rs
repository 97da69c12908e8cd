//! Bounded Retry With Exponential Backoff
//!
//! Every network call in the engine goes through `retry_with_backoff`:
//! transport errors are retried up to the configured budget, doubling the
//! delay each time; anything else is returned immediately. Both the call
//! and the sleep race the cancellation token, so shutdown never waits out a
//! hung request or a backoff.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use crate::config::NodeConfig;
use crate::error::{EngineError, Result};
use std::future::Future;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Upper bound on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            initial_backoff,
        }
    }

    pub fn from_config(node: &NodeConfig) -> Self {
        Self::new(node.max_retries, Duration::from_millis(node.initial_backoff_ms))
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            outcome = op(attempt) => outcome,
        };
        match outcome {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Retry {}/{} for {}: {} (backoff {}ms)",
                    attempt,
                    policy.max_attempts - 1,
                    label,
                    e,
                    delay.as_millis()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
