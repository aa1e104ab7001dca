//! routeweave: convention-routed HTTP endpoints with a declarative wrapper pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!   RouteGroup ("Users")              App::register
//!     get_by_id ──▶ routing ──▶ GET /users/{id} ──▶ Pipeline::compose
//!                                                        │
//!   Client Request ──▶ http (request id, axum) ──▶ RequestContext
//!                                                        │
//!        ┌───────────────────────────────────────────────▼──────────────────────┐
//!        │ deprecation → rate_limit → version → auth → cache → timeout → retry  │
//!        │                                   → speed → log → Handler            │
//!        └───────────────────────────────────────────────┬──────────────────────┘
//!                                                        │
//!   Client Response ◀── ApiResponse | error envelope ◀───┘
//!
//!   Shared stores (injected via PipelineServices): cache, rate limiter, auth slot, clock
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod versioning;

pub use config::AppConfig;
pub use error::{ConfigError, HandlerError};
pub use http::{ApiResponse, App, RequestContext};
pub use lifecycle::Shutdown;
pub use pipeline::{EndpointPolicy, Handler, HandlerResult};
pub use routing::{Endpoint, RouteGroup};
