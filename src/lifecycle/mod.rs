//! Process lifecycle: bring-up, signal handling, graceful stop.
//!
//! # Data Flow
//! ```text
//! main
//!     → startup::init_observability (subscriber, optional Prometheus exporter)
//!     → App::register for each route group
//!     → startup::bind_listener
//!     → App::serve(listener, shutdown.subscribe())
//!
//! SIGINT / SIGTERM
//!     → signals::trigger_on_signal → Shutdown::trigger
//!     → axum stops accepting, in-flight pipelines finish, serve returns
//! ```
//!
//! # Design Decisions
//! - Route groups are registered before the listener is bound, so a duplicate
//!   route or bad template fails the process before it accepts traffic
//! - One broadcast channel fans the stop signal out to every subscriber

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
