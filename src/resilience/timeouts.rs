//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a future by a deadline
//! - Cancel it cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timed-out future is dropped, not detached
//! - Timing out is an explicit outcome, distinct from the future's own errors

use std::future::Future;
use std::time::Duration;

/// Result of running a future against a deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutOutcome<T> {
    Completed(T),
    TimedOut { after: Duration },
}

impl<T> TimeoutOutcome<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, TimeoutOutcome::TimedOut { .. })
    }
}

/// Run `future` for at most `duration`.
pub async fn run_with_timeout<F>(duration: Duration, future: F) -> TimeoutOutcome<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(duration, future).await {
        Ok(output) => TimeoutOutcome::Completed(output),
        Err(_) => TimeoutOutcome::TimedOut { after: duration },
    }
}
