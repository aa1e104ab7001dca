//! HTTP edge subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request id assigned, echoed on the way out)
//!     → server.rs (axum route match, path param types, body limit)
//!     → context.rs (RequestContext built from the request)
//!     → [endpoint pipeline: wrappers + handler]
//!     → response.rs (ApiResponse → HTTP response)
//!       or envelope.rs (Rejection → structured error body)
//!     → Send to client
//! ```

pub mod context;
pub mod envelope;
pub mod request;
pub mod response;
pub mod server;

pub use context::{RequestContext, RequestContextBuilder};
pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use response::{ApiResponse, ResponseBody};
pub use server::App;
