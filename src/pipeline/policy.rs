//! Declarative wrapper settings attached to an endpoint.
//!
//! Each options struct corresponds to one wrapper. Fields are public and builders
//! cover the common adjustments; anything that can be malformed (version
//! constraints, cache key templates, vary entries) is parsed in a fallible
//! constructor so mistakes surface at declaration time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{KeyTemplate, Vary};
use crate::error::{ConfigError, HandlerError};
use crate::resilience::RetryPolicy;
use crate::security::{AuthRequirement, RateLimitBy};
use crate::versioning::VersionConstraint;

/// Sliding-window rate limit.
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub limit: u32,
    pub window: Duration,
    pub by: RateLimitBy,
    /// Replaces the default "Rate limit exceeded" message.
    pub message: Option<String>,
}

impl RateLimitOptions {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            ..Self::default()
        }
    }

    pub fn by(mut self, by: RateLimitBy) -> Self {
        self.by = by;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
            by: RateLimitBy::Ip,
            message: None,
        }
    }
}

/// Client version requirement.
#[derive(Debug, Clone)]
pub struct VersionOptions {
    pub constraint: VersionConstraint,
    pub deprecated: bool,
    pub sunset: Option<String>,
    pub message: Option<String>,
}

impl VersionOptions {
    pub fn new(constraint: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            constraint: VersionConstraint::parse(constraint)?,
            deprecated: false,
            sunset: None,
            message: None,
        })
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn sunset(mut self, date: impl Into<String>) -> Self {
        self.sunset = Some(date.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Authorization requirement checked by the app's delegate.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub enabled: bool,
    pub requirement: AuthRequirement,
    /// Replaces the default "Not authenticated" denial message.
    pub error_message: Option<String>,
}

impl AuthOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly public endpoint.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirement.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirement.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn require_all(mut self, require_all: bool) -> Self {
        self.requirement.require_all = require_all;
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            requirement: AuthRequirement::default(),
            error_message: None,
        }
    }
}

pub const DEFAULT_DEPRECATION_MESSAGE: &str = "This endpoint is deprecated";

/// Deprecation notice.
#[derive(Debug, Clone)]
pub struct DeprecationOptions {
    pub message: String,
    pub alternative: Option<String>,
    pub sunset: Option<String>,
}

impl DeprecationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternative = Some(alternative.into());
        self
    }

    pub fn sunset(mut self, date: impl Into<String>) -> Self {
        self.sunset = Some(date.into());
        self
    }
}

impl Default for DeprecationOptions {
    fn default() -> Self {
        Self {
            message: DEFAULT_DEPRECATION_MESSAGE.to_string(),
            alternative: None,
            sunset: None,
        }
    }
}

/// Response caching.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Zero disables caching.
    pub ttl: Duration,
    pub key: Option<KeyTemplate>,
    pub vary: Vec<Vary>,
    pub stale_while_revalidate: Duration,
    /// Store every status, not just 200, 203 and 204.
    pub cache_errors: bool,
}

impl CacheOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            key: None,
            vary: vec![Vary::Query],
            stale_while_revalidate: Duration::ZERO,
            cache_errors: false,
        }
    }

    pub fn key(mut self, template: &str) -> Result<Self, ConfigError> {
        self.key = Some(KeyTemplate::parse(template)?);
        Ok(self)
    }

    /// Replace the vary list (`query`, `headers:<Name>`).
    pub fn vary<I, S>(mut self, entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.vary = entries
            .into_iter()
            .map(|entry| entry.as_ref().parse::<Vary>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self)
    }

    pub fn stale_while_revalidate(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = window;
        self
    }

    pub fn cache_errors(mut self, cache_errors: bool) -> Self {
        self.cache_errors = cache_errors;
        self
    }
}

/// Deadline around everything nested inside the timeout wrapper.
#[derive(Debug, Clone)]
pub struct TimeoutOptions {
    pub duration: Duration,
    pub message: Option<String>,
}

impl TimeoutOptions {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Decides whether a handler failure is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&HandlerError) -> bool + Send + Sync>;

/// Retries of failed handler invocations.
#[derive(Clone)]
pub struct RetryOptions {
    pub policy: RetryPolicy,
    pub retryable: RetryPredicate,
}

impl RetryOptions {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            policy: RetryPolicy::new(attempts, delay, backoff),
            ..Self::default()
        }
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HandlerError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            retryable: Arc::new(|_: &HandlerError| true),
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Handler timing.
#[derive(Debug, Clone, Default)]
pub struct SpeedOptions {
    pub warn_threshold: Option<Duration>,
    pub error_threshold: Option<Duration>,
    /// Add `X-Response-Time` to successful responses.
    pub include_in_response: bool,
}

impl SpeedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn_after(mut self, threshold: Duration) -> Self {
        self.warn_threshold = Some(threshold);
        self
    }

    pub fn error_after(mut self, threshold: Duration) -> Self {
        self.error_threshold = Some(threshold);
        self
    }

    pub fn include_in_response(mut self) -> Self {
        self.include_in_response = true;
        self
    }
}

/// Level for call/return events of the log wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level `{}`", other)),
        }
    }
}

/// Call/return logging.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: LogLevel,
    pub include_args: bool,
    pub include_result: bool,
    pub max_length: usize,
    pub message: Option<String>,
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn include_args(mut self, include: bool) -> Self {
        self.include_args = include;
        self
    }

    pub fn include_result(mut self, include: bool) -> Self {
        self.include_result = include;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_args: true,
            include_result: true,
            max_length: 200,
            message: None,
        }
    }
}

/// Every wrapper an endpoint opted into. `None` means the wrapper is absent.
#[derive(Debug, Clone, Default)]
pub struct EndpointPolicy {
    pub deprecated: Option<DeprecationOptions>,
    pub rate_limit: Option<RateLimitOptions>,
    pub version: Option<VersionOptions>,
    pub auth: Option<AuthOptions>,
    pub cache: Option<CacheOptions>,
    pub timeout: Option<TimeoutOptions>,
    pub retry: Option<RetryOptions>,
    pub speed: Option<SpeedOptions>,
    pub log: Option<LogOptions>,
}

impl EndpointPolicy {
    /// Whether a registered auth delegate is required to serve this endpoint.
    pub fn requires_auth(&self) -> bool {
        self.auth.as_ref().is_some_and(|auth| auth.enabled)
    }
}
