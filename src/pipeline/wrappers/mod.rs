//! Wrapper implementations, one per cross-cutting behavior.

mod auth;
mod cache;
mod deprecation;
mod log;
mod rate_limit;
mod retry;
mod speed;
mod timeout;
mod version;

pub use auth::AuthWrapper;
pub use cache::CacheWrapper;
pub use deprecation::DeprecationWrapper;
pub use log::LogWrapper;
pub use rate_limit::RateLimitWrapper;
pub use retry::RetryWrapper;
pub use speed::SpeedWrapper;
pub use timeout::TimeoutWrapper;
pub use version::VersionWrapper;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ConfigError;

use super::Flow;

pub const DEPRECATION: HeaderName = HeaderName::from_static("deprecation");
pub const SUNSET: HeaderName = HeaderName::from_static("sunset");
pub const X_DEPRECATION_MESSAGE: HeaderName = HeaderName::from_static("x-deprecation-message");
pub const X_DEPRECATION_ALTERNATIVE: HeaderName =
    HeaderName::from_static("x-deprecation-alternative");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Parse a header value configured on an endpoint.
fn configured_value(name: &'static str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeaderValue {
        name,
        value: value.to_string(),
    })
}

/// Copy `headers` onto whichever side of the flow came back.
fn annotate(mut flow: Flow, headers: &HeaderMap) -> Flow {
    let target = match &mut flow {
        Ok(response) => response.headers_mut(),
        Err(rejection) => rejection.headers_mut(),
    };
    for (name, value) in headers {
        target.insert(name.clone(), value.clone());
    }
    flow
}

/// `Deprecation`/`Sunset`/message headers shared by the deprecation and version wrappers.
fn deprecation_headers(
    sunset: Option<&str>,
    message: Option<&str>,
    alternative: Option<&str>,
) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(DEPRECATION, HeaderValue::from_static("true"));
    if let Some(sunset) = sunset {
        headers.insert(SUNSET, configured_value("Sunset", sunset)?);
    }
    if let Some(alternative) = alternative {
        headers.insert(
            X_DEPRECATION_ALTERNATIVE,
            configured_value("X-Deprecation-Alternative", alternative)?,
        );
    }
    if let Some(message) = message {
        headers.insert(
            X_DEPRECATION_MESSAGE,
            configured_value("X-Deprecation-Message", message)?,
        );
    }
    Ok(headers)
}
