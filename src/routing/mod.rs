//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint identifier ("get_user_by_id")
//!     → deriver.rs (verb + sub-path template)
//!     → group.rs (prefix with the group's base path, attach param types + policy)
//!     → EndpointDescriptor (immutable)
//!     → http::App::register (duplicate check, axum route table)
//! ```
//!
//! # Design Decisions
//! - Routes are derived once at registration, immutable at runtime
//! - Identifiers that do not start with a known verb are skipped, never rejected
//! - Deterministic: the same identifier always yields the same route

pub mod deriver;
pub mod group;

pub use deriver::{derive_route, path_placeholders, route_shape};
pub use group::{Endpoint, EndpointDescriptor, ParamType, RegisteredEndpoint, RouteGroup};
