//! Short-circuit results of the wrapper chain.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{Map, Value};

use crate::error::{ConfigError, HandlerError};

/// Why a request did not produce a handler response.
#[derive(Debug)]
pub enum RejectionKind {
    /// A wrapper refused the request (auth, version, rate limit).
    Denied {
        status: StatusCode,
        code: Cow<'static, str>,
        message: String,
    },
    /// The deadline passed before the handler finished.
    TimedOut { after: Duration, message: String },
    /// The endpoint or the app is misconfigured.
    Misconfigured(ConfigError),
    /// Unexpected failure inside a wrapper or delegate.
    Internal { message: String },
    /// The handler failed; carried unchanged.
    Upstream(HandlerError),
}

/// Explicit failure value returned through the wrapper chain.
///
/// Carries structured details for the error body and headers for the response,
/// so outer wrappers can still annotate a rejected request.
#[derive(Debug)]
pub struct Rejection {
    kind: RejectionKind,
    details: Map<String, Value>,
    headers: HeaderMap,
}

impl Rejection {
    fn from_kind(kind: RejectionKind) -> Self {
        Self {
            kind,
            details: Map::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn denied(
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self::from_kind(RejectionKind::Denied {
            status,
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn timed_out(after: Duration, message: impl Into<String>) -> Self {
        Self::from_kind(RejectionKind::TimedOut {
            after,
            message: message.into(),
        })
        .with_detail("timeout_secs", after.as_secs_f64())
    }

    pub fn misconfigured(error: ConfigError) -> Self {
        Self::from_kind(RejectionKind::Misconfigured(error))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::from_kind(RejectionKind::Internal {
            message: message.into(),
        })
    }

    pub fn upstream(error: HandlerError) -> Self {
        Self::from_kind(RejectionKind::Upstream(error))
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn kind(&self) -> &RejectionKind {
        &self.kind
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            RejectionKind::Denied { status, .. } => *status,
            RejectionKind::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            RejectionKind::Misconfigured(_) | RejectionKind::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RejectionKind::Upstream(err) => err.status(),
        }
    }

    pub fn code(&self) -> &str {
        match &self.kind {
            RejectionKind::Denied { code, .. } => code,
            RejectionKind::TimedOut { .. } => "timeout",
            RejectionKind::Misconfigured(_) => "configuration_error",
            RejectionKind::Internal { .. } => "internal_error",
            RejectionKind::Upstream(err) => err.code(),
        }
    }

    pub fn message(&self) -> Cow<'_, str> {
        match &self.kind {
            RejectionKind::Denied { message, .. }
            | RejectionKind::TimedOut { message, .. }
            | RejectionKind::Internal { message } => Cow::Borrowed(message),
            RejectionKind::Misconfigured(err) => Cow::Owned(err.to_string()),
            RejectionKind::Upstream(err) => Cow::Borrowed(err.message()),
        }
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The handler failure, when this rejection carries one.
    pub fn as_upstream(&self) -> Option<&HandlerError> {
        match &self.kind {
            RejectionKind::Upstream(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_upstream(self) -> Option<HandlerError> {
        match self.kind {
            RejectionKind::Upstream(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, RejectionKind::TimedOut { .. })
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.status().as_u16(), self.code(), self.message())
    }
}

impl From<HandlerError> for Rejection {
    fn from(error: HandlerError) -> Self {
        Self::upstream(error)
    }
}
