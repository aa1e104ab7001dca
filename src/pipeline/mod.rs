//! Endpoint wrapper pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → deprecation   (always proceeds, annotates success and failure)
//!     → rate_limit    (429 when the sliding window is full)
//!     → version       (400 when the client version is missing or incompatible)
//!     → auth          (403 on denial, 500 when no delegate is registered)
//!     → cache         (fresh/stale hit answers here, 304 on matching ETag)
//!     → timeout       (504 when the deadline passes, cancels everything below)
//!     → retry         (re-runs handler failures accepted by the predicate)
//!     → speed         (handler timing)
//!     → log           (call/return events)
//!     → Handler
//! ```
//!
//! # Design Decisions
//! - Every wrapper has one contract: short-circuit with a `Rejection` or call `next`
//! - Order is fixed; an endpoint only chooses which wrappers are present
//! - Shared stores are injected through `PipelineServices`, never global
//! - Misconfiguration is caught in `Pipeline::compose` where it can be

pub mod handler;
pub mod policy;
pub mod rejection;
pub mod wrappers;

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::http::HeaderName;
use sha2::{Digest, Sha256};

use crate::cache::{CacheBackend, MemoryCacheStore};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::http::{ApiResponse, RequestContext};
use crate::routing::EndpointDescriptor;
use crate::security::{AuthSlot, SlidingWindowLimiter};

pub use handler::{Handler, HandlerResult};
pub use policy::{
    AuthOptions, CacheOptions, DeprecationOptions, EndpointPolicy, LogLevel, LogOptions,
    RateLimitOptions, RetryOptions, SpeedOptions, TimeoutOptions, VersionOptions,
};
pub use rejection::{Rejection, RejectionKind};

/// Outcome of a wrapper or of the whole chain.
pub type Flow = Result<ApiResponse, Rejection>;

/// One cross-cutting behavior around the handler.
#[async_trait]
pub trait Wrapper: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow;
}

/// The remainder of the chain below a wrapper.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    wrappers: &'a [Box<dyn Wrapper>],
    handler: &'a Handler,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain. `Next` is `Copy`, so a wrapper may call this repeatedly.
    pub async fn run(self, ctx: RequestContext) -> Flow {
        match self.wrappers.split_first() {
            Some((wrapper, rest)) => {
                let next = Next {
                    wrappers: rest,
                    handler: self.handler,
                };
                wrapper.handle(ctx, next).await
            }
            None => self.handler.call(ctx).await.map_err(Rejection::upstream),
        }
    }
}

/// Maps a request to a stable user subject for per-user rate limiting.
pub type SubjectResolver = Arc<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>;

/// Versioning behaviour shared by all version wrappers of an app.
#[derive(Debug, Clone)]
pub struct VersioningSettings {
    /// Reject requests without a version header on versioned endpoints.
    pub strict: bool,
    pub header: HeaderName,
}

impl Default for VersioningSettings {
    fn default() -> Self {
        Self {
            strict: false,
            header: HeaderName::from_static("x-api-version"),
        }
    }
}

/// Stores and collaborators shared by every pipeline of an app.
#[derive(Clone)]
pub struct PipelineServices {
    pub cache: Arc<dyn CacheBackend>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub auth: AuthSlot,
    pub clock: Arc<dyn Clock>,
    pub versioning: VersioningSettings,
    subject_resolver: Arc<RwLock<Option<SubjectResolver>>>,
}

impl PipelineServices {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Arc::new(MemoryCacheStore::new()),
            limiter: Arc::new(SlidingWindowLimiter::new(clock.clone())),
            auth: AuthSlot::new(),
            clock,
            versioning: VersioningSettings::default(),
            subject_resolver: Arc::new(RwLock::new(None)),
        }
    }

    /// Switch to another clock. The rate limiter is rebuilt on it and starts empty;
    /// every other store and collaborator is kept.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = Arc::new(SlidingWindowLimiter::new(clock.clone()));
        self.clock = clock;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_versioning(mut self, versioning: VersioningSettings) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn set_subject_resolver(&self, resolver: SubjectResolver) {
        *self
            .subject_resolver
            .write()
            .expect("subject resolver lock poisoned") = Some(resolver);
    }

    /// Subject for per-user buckets: the registered resolver, then a fingerprint of
    /// the `Authorization` header. `None` means anonymous.
    pub fn resolve_subject(&self, ctx: &RequestContext) -> Option<String> {
        let resolver = self
            .subject_resolver
            .read()
            .expect("subject resolver lock poisoned")
            .clone();
        if let Some(subject) = resolver.and_then(|resolve| resolve(ctx)) {
            return Some(subject);
        }

        let credentials = ctx.header("authorization")?.trim();
        if credentials.is_empty() {
            return None;
        }
        let digest = Sha256::digest(credentials.as_bytes());
        let fingerprint: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        Some(format!("auth-{}", fingerprint))
    }
}

impl Default for PipelineServices {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineServices")
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .field("auth", &self.auth)
            .field("versioning", &self.versioning)
            .finish_non_exhaustive()
    }
}

/// The composed wrappers and handler for one endpoint.
pub struct Pipeline {
    wrappers: Vec<Box<dyn Wrapper>>,
    handler: Handler,
}

impl Pipeline {
    /// Build the chain for an endpoint in the fixed wrapper order.
    pub fn compose(
        descriptor: &EndpointDescriptor,
        policy: &EndpointPolicy,
        handler: Handler,
        services: &PipelineServices,
    ) -> Result<Self, ConfigError> {
        use wrappers::*;

        let mut chain: Vec<Box<dyn Wrapper>> = Vec::new();

        if let Some(options) = &policy.deprecated {
            chain.push(Box::new(DeprecationWrapper::new(options)?));
        }
        if let Some(options) = &policy.rate_limit {
            chain.push(Box::new(RateLimitWrapper::new(
                options.clone(),
                services.clone(),
            )));
        }
        if let Some(options) = &policy.version {
            chain.push(Box::new(VersionWrapper::new(
                options.clone(),
                services.versioning.clone(),
            )?));
        }
        if let Some(options) = &policy.auth {
            chain.push(Box::new(AuthWrapper::new(options.clone(), services.auth.clone())));
        }
        if let Some(options) = &policy.cache {
            if let Some(template) = &options.key {
                template.validate(descriptor.param_names())?;
            }
            chain.push(Box::new(CacheWrapper::new(
                options.clone(),
                services.cache.clone(),
                services.clock.clone(),
            )));
        }
        if let Some(options) = &policy.timeout {
            if handler.is_blocking() {
                tracing::debug!(
                    handler = %descriptor.handler(),
                    "Timeout on a blocking handler cannot stop the worker thread"
                );
            }
            chain.push(Box::new(TimeoutWrapper::new(options.clone())));
        }
        if let Some(options) = &policy.retry {
            chain.push(Box::new(RetryWrapper::new(options.clone())));
        }
        if let Some(options) = &policy.speed {
            chain.push(Box::new(SpeedWrapper::new(options.clone())));
        }
        if let Some(options) = &policy.log {
            chain.push(Box::new(LogWrapper::new(options.clone())));
        }

        Ok(Self {
            wrappers: chain,
            handler,
        })
    }

    /// A pipeline with no wrappers.
    pub fn bare(handler: Handler) -> Self {
        Self {
            wrappers: Vec::new(),
            handler,
        }
    }

    pub async fn run(&self, ctx: RequestContext) -> Flow {
        Next {
            wrappers: &self.wrappers,
            handler: &self.handler,
        }
        .run(ctx)
        .await
    }

    /// Wrapper names, outermost first.
    pub fn wrapper_names(&self) -> Vec<&'static str> {
        self.wrappers.iter().map(|w| w.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("wrappers", &self.wrapper_names())
            .field("handler", &self.handler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::routing::ParamType;
    use axum::http::{Method, StatusCode};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn descriptor(path: &str, params: &[&str]) -> EndpointDescriptor {
        let params: BTreeMap<String, ParamType> = params
            .iter()
            .map(|p| (p.to_string(), ParamType::String))
            .collect();
        EndpointDescriptor::new(Method::GET, path, "Items.get", params)
    }

    fn ok_handler() -> Handler {
        Handler::new(|_ctx| async { Ok(ApiResponse::text("ok")) })
    }

    #[test]
    fn test_wrappers_compose_in_fixed_order() {
        let policy = EndpointPolicy {
            log: Some(LogOptions::default()),
            speed: Some(SpeedOptions::default()),
            retry: Some(RetryOptions::default()),
            timeout: Some(TimeoutOptions::default()),
            cache: Some(CacheOptions::new(Duration::from_secs(60))),
            auth: Some(AuthOptions::default()),
            version: Some(VersionOptions::new(">=1.0").unwrap()),
            rate_limit: Some(RateLimitOptions::default()),
            deprecated: Some(DeprecationOptions::default()),
        };
        let pipeline = Pipeline::compose(
            &descriptor("/items", &[]),
            &policy,
            ok_handler(),
            &PipelineServices::default(),
        )
        .unwrap();

        assert_eq!(
            pipeline.wrapper_names(),
            vec![
                "deprecation",
                "rate_limit",
                "version",
                "auth",
                "cache",
                "timeout",
                "retry",
                "speed",
                "log"
            ]
        );
    }

    #[test]
    fn test_cache_template_checked_against_params() {
        let policy = EndpointPolicy {
            cache: Some(
                CacheOptions::new(Duration::from_secs(60))
                    .key("item:{item_id}")
                    .unwrap(),
            ),
            ..EndpointPolicy::default()
        };
        let services = PipelineServices::default();

        assert!(Pipeline::compose(
            &descriptor("/items/{item_id}", &["item_id"]),
            &policy,
            ok_handler(),
            &services
        )
        .is_ok());
        assert!(matches!(
            Pipeline::compose(&descriptor("/items/{id}", &["id"]), &policy, ok_handler(), &services),
            Err(ConfigError::InvalidKeyTemplate { .. })
        ));
    }

    #[test]
    fn test_clock_swap_keeps_collaborators() {
        let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCacheStore::new());
        let services = PipelineServices::default().with_cache(cache.clone());
        services.set_subject_resolver(Arc::new(|_ctx: &RequestContext| Some("fixed".to_string())));

        let swapped = services.with_clock(Arc::new(crate::clock::ManualClock::new()));
        let ctx = RequestContext::builder(Method::GET, "/").build();

        assert!(Arc::ptr_eq(&swapped.cache, &cache));
        assert_eq!(swapped.resolve_subject(&ctx).as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn test_bare_pipeline_maps_handler_errors_to_upstream() {
        let pipeline = Pipeline::bare(Handler::new(|_ctx| async {
            Err(HandlerError::not_found("no such item"))
        }));
        let ctx = RequestContext::builder(Method::GET, "/items/9").build();

        let rejection = pipeline.run(ctx).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::NOT_FOUND);
        assert!(rejection.as_upstream().is_some());
    }

    #[test]
    fn test_subject_resolution_order() {
        let services = PipelineServices::default();
        let anonymous = RequestContext::builder(Method::GET, "/").build();
        let bearer = RequestContext::builder(Method::GET, "/")
            .header("authorization", "Bearer abc")
            .build();

        assert_eq!(services.resolve_subject(&anonymous), None);
        let fingerprint = services.resolve_subject(&bearer).unwrap();
        assert!(fingerprint.starts_with("auth-"));
        assert_eq!(services.resolve_subject(&bearer), Some(fingerprint));

        services.set_subject_resolver(Arc::new(|ctx: &RequestContext| {
            ctx.header("x-user-id").map(str::to_string)
        }));
        let with_user = RequestContext::builder(Method::GET, "/")
            .header("x-user-id", "u-42")
            .header("authorization", "Bearer abc")
            .build();
        assert_eq!(services.resolve_subject(&with_user).as_deref(), Some("u-42"));
    }
}
