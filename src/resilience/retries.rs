//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failing operation while the predicate accepts the failure
//! - Wait the backoff delay between attempts without blocking other tasks
//! - Stop at `max_attempts` and hand back the last failure untouched
//!
//! # Design Decisions
//! - The predicate sees the caller's own error type; nothing is wrapped
//! - Success returns immediately, no delay is charged
//! - One warning per failed attempt, an error when attempts run out

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::observability::metrics;
use crate::resilience::backoff::backoff_delay;

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier,
        }
    }

    /// Delay before `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.initial_delay, self.backoff_multiplier)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    label: String,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            label: "operation".to_string(),
        }
    }

    /// Name used in log events and metrics.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<T, E, Op, Fut, P>(&self, mut operation: Op, retryable: P) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let delay = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = %self.label,
                            attempt,
                            "Succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if !retryable(&err) => {
                    tracing::debug!(
                        operation = %self.label,
                        attempt,
                        error = %err,
                        "Failure is not retryable"
                    );
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    tracing::error!(
                        operation = %self.label,
                        attempts = max_attempts,
                        error = %err,
                        "All retry attempts failed"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.policy.delay_before(attempt + 1);
                    tracing::warn!(
                        operation = %self.label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    delay
                }
            };

            metrics::record_retry(&self.label);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
