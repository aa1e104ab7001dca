//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (inside the endpoint pipeline):
//!     → rate_limit.rs (sliding window admission per ip / user / global bucket)
//!     → auth.rs (application-supplied delegate decides on roles and scopes)
//!     → Pass to the next wrapper
//! ```
//!
//! # Design Decisions
//! - Fail closed: auth enabled without a delegate rejects, never allows
//! - Denials are explicit results, never silent drops
//! - No trust in client input; the Authorization header is forwarded opaquely

pub mod auth;
pub mod rate_limit;

pub use auth::{AuthDelegate, AuthError, AuthRequirement, AuthSlot, FnAuthDelegate};
pub use rate_limit::{bucket_key, run_sweeper, RateDecision, RateLimitBy, SlidingWindowLimiter};
