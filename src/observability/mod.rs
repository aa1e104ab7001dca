//! Logs, metrics and request spans.
//!
//! # Data Flow
//! ```text
//! Edge (http::server)        → tracing.rs span per request, tagged with its request id
//!                            → metrics.rs request counter and latency histogram
//! Wrappers (pipeline::*)     → structured events: denials, cache outcomes, retries,
//!                              timeouts, handler timing, call/return logs
//!                            → metrics.rs per-handler counters
//! Binary (lifecycle::startup) → logging.rs subscriber, metrics.rs exporter
//! ```
//!
//! # Design Decisions
//! - Events carry fields (`handler`, `key`, `retry_after`), not formatted text
//! - Metric labels use route templates and handler names, never concrete paths
//! - Recording is a no-op until the binary installs an exporter

pub mod logging;
pub mod metrics;
pub mod tracing;
