//! Error taxonomy shared across the crate.
//!
//! # Design Decisions
//! - `ConfigError` is fatal and raised while endpoints are being declared or registered
//! - `HandlerError` is what user handlers return; retry predicates inspect it
//! - Denials and timeouts are not errors here; they are `pipeline::Rejection` values

use std::borrow::Cow;

use axum::http::{Method, StatusCode};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Machine-readable error code for a status without a more specific one.
pub fn code_for_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        401 => "auth_required",
        403 => "forbidden",
        404 => "not_found",
        408 | 504 => "timeout",
        413 => "payload_too_large",
        429 => "rate_limited",
        s if s >= 500 => "internal_error",
        _ => "validation_error",
    }
}

/// Misconfiguration detected at declaration, registration or first request.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Version constraint could not be parsed.
    #[error("Invalid version constraint: {0}")]
    InvalidConstraint(String),

    /// Version string has a non-numeric leading component.
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Cache key template is malformed or references an unknown placeholder.
    #[error("Invalid cache key template `{template}`: {reason}")]
    InvalidKeyTemplate { template: String, reason: String },

    /// Cache `vary` entry is not `query` or `headers:<Name>`.
    #[error("Invalid cache vary entry: {0}")]
    InvalidVary(String),

    /// Glob pattern for cache invalidation is malformed.
    #[error("Invalid invalidation pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Header value configured on an endpoint is not a valid HTTP header value.
    #[error("Invalid value for header {name}: {value:?}")]
    InvalidHeaderValue { name: &'static str, value: String },

    /// Authentication is enabled on an endpoint but the app has no delegate.
    #[error("Authentication is enabled but no handler is configured.")]
    MissingAuthDelegate,

    /// Two path templates differ only in placeholder names, so the router cannot
    /// tell them apart.
    #[error("Conflicting routes {existing_path} (`{existing}`) and {path} (`{duplicate}`)")]
    ConflictingRoute {
        path: String,
        existing_path: String,
        existing: String,
        duplicate: String,
    },

    /// Two endpoints resolve to the same method and path.
    #[error("Duplicate route {method} {path}: `{existing}` and `{duplicate}`")]
    DuplicateRoute {
        method: Method,
        path: String,
        existing: String,
        duplicate: String,
    },
}

/// Typed failure raised by a user handler.
///
/// Carries the status and machine-readable code the client should see once the
/// failure escapes the pipeline.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    status: StatusCode,
    code: Cow<'static, str>,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Error whose code is derived from the status.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, code_for_status(status), message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Temporary upstream failure; the usual target of a retry predicate.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for 5xx failures, which are the ones worth retrying by default.
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}
