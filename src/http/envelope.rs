//! Structured error bodies.
//!
//! # Data Flow
//! ```text
//! Rejection (denied / timed out / misconfigured / internal / upstream)
//!     → status, machine code, message, details
//!     → {"error": {code, message, ...details}, "request_id", "timestamp"}
//!       or, with the envelope disabled, {"detail": message, ...details}
//!     → rejection headers copied onto the response
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::code_for_status;
use crate::pipeline::Rejection;

/// Render a rejection as the client-facing error response.
pub fn render_rejection(rejection: Rejection, request_id: &str, envelope: bool) -> Response {
    let status = rejection.status();
    let body = if envelope {
        let mut error = Map::new();
        error.insert("code".into(), Value::from(rejection.code()));
        error.insert("message".into(), Value::from(rejection.message().into_owned()));
        for (key, value) in rejection.details() {
            error.insert(key.clone(), value.clone());
        }
        json!({
            "error": error,
            "request_id": request_id,
            "timestamp": timestamp(),
        })
    } else {
        let mut flat = Map::new();
        flat.insert("detail".into(), Value::from(rejection.message().into_owned()));
        for (key, value) in rejection.details() {
            flat.insert(key.clone(), value.clone());
        }
        Value::Object(flat)
    };

    let mut response = (status, Json(body)).into_response();
    response.headers_mut().extend(rejection.headers().clone());
    response
}

/// Error response for failures outside any endpoint pipeline (404, oversized body, bad params).
pub fn render_status(
    status: StatusCode,
    message: impl Into<String>,
    request_id: &str,
    envelope: bool,
) -> Response {
    let rejection = Rejection::denied(status, code_for_status(status), message);
    render_rejection(rejection, request_id, envelope)
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
