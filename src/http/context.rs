//! Typed request context passed through every wrapper and into the handler.
//!
//! # Design Decisions
//! - Built once by the HTTP edge (or a test) and never mutated afterwards
//! - Cheap to clone; the retry wrapper hands a clone to every attempt
//! - Query pairs keep their arrival order; cache keys sort them separately

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;

use crate::error::HandlerError;
use crate::http::request::RequestId;

#[derive(Debug)]
struct Inner {
    request_id: RequestId,
    method: Method,
    path: String,
    route: String,
    handler: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    path_params: BTreeMap<String, String>,
    client_ip: Option<IpAddr>,
    body: Bytes,
}

/// Everything a wrapper or handler may know about the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    pub fn builder(method: Method, path: impl Into<String>) -> RequestContextBuilder {
        let path = path.into();
        RequestContextBuilder {
            inner: Inner {
                request_id: RequestId::generate(),
                method,
                route: path.clone(),
                path,
                handler: String::new(),
                query: Vec::new(),
                headers: HeaderMap::new(),
                path_params: BTreeMap::new(),
                client_ip: None,
                body: Bytes::new(),
            },
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.inner.request_id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Concrete request path.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Route template the request matched, e.g. `/users/{id}`.
    pub fn route(&self) -> &str {
        &self.inner.route
    }

    /// Qualified handler name, e.g. `Users.get_by_id`.
    pub fn handler(&self) -> &str {
        &self.inner.handler
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.inner.query
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.inner
            .query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header value as text; `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.inner.path_params.get(name).map(String::as_str)
    }

    pub fn path_params(&self) -> &BTreeMap<String, String> {
        &self.inner.path_params
    }

    /// Parse a path parameter, failing with a 422 when missing or malformed.
    pub fn path_param_as<T: FromStr>(&self, name: &str) -> Result<T, HandlerError> {
        let raw = self
            .path_param(name)
            .ok_or_else(|| HandlerError::validation(format!("Missing path parameter `{}`", name)))?;
        raw.parse().map_err(|_| {
            HandlerError::validation(format!("Invalid value for path parameter `{}`: {}", name, raw))
        })
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.inner.client_ip
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    /// Deserialize the JSON body, failing with a 422.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_slice(&self.inner.body)
            .map_err(|e| HandlerError::validation(format!("Invalid JSON body: {}", e)))
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug)]
pub struct RequestContextBuilder {
    inner: Inner,
}

impl RequestContextBuilder {
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.inner.request_id = id;
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.inner.route = route.into();
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.inner.handler = handler.into();
        self
    }

    /// Parse a raw (undecoded) query string.
    pub fn query(mut self, raw: &str) -> Self {
        self.inner.query = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self
    }

    /// Add a header; invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.inner.headers.append(name, value);
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.inner.headers = headers;
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.path_params.insert(name.into(), value.into());
        self
    }

    pub fn path_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.inner.path_params = params;
        self
    }

    pub fn client_ip(mut self, ip: IpAddr) -> Self {
        self.inner.client_ip = Some(ip);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.inner.body = body.into();
        self
    }

    pub fn build(self) -> RequestContext {
        RequestContext {
            inner: Arc::new(self.inner),
        }
    }
}
