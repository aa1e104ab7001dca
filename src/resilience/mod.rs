//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Handler invocation:
//!     → timeouts.rs (deadline around the whole call, including retry waits)
//!     → retries.rs (re-run failures matching the predicate)
//!     → backoff.rs (delay before each further attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts cancel the in-flight future; dropping it releases what it held
//! - Retry waits are async sleeps, so an enclosing timeout can cancel them
//! - The last failure propagates unchanged once attempts run out

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::backoff_delay;
pub use retries::{RetryExecutor, RetryPolicy};
pub use timeouts::{run_with_timeout, TimeoutOutcome};
