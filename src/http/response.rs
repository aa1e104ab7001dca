//! Handler response model.
//!
//! # Design Decisions
//! - Bodies stay structured (`Json`/`Text`) until the edge, so the cache can store
//!   and fingerprint them and the log wrapper can preview them
//! - Header mutation is open to wrappers; status is fixed at construction

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerError;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

/// What a handler returns on success.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// 200 with a JSON body.
    pub fn json(value: Value) -> Self {
        Self::new(StatusCode::OK, ResponseBody::Json(value))
    }

    /// 200 with any serializable body.
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        let value = serde_json::to_value(value)
            .map_err(|e| HandlerError::internal("Failed to serialize response").with_source(e))?;
        Ok(Self::json(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, ResponseBody::Text(text.into()))
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, ResponseBody::Empty)
    }

    pub fn not_modified() -> Self {
        Self::new(StatusCode::NOT_MODIFIED, ResponseBody::Empty)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            ResponseBody::Empty => self.status.into_response(),
            ResponseBody::Json(value) => (self.status, Json(value)).into_response(),
            ResponseBody::Text(text) => (
                self.status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response(),
        };
        response.headers_mut().extend(self.headers);
        response
    }
}
