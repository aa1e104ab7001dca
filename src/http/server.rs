//! Application assembly and serving.
//!
//! # Responsibilities
//! - Register route groups: derive routes, reject duplicates, compose pipelines
//! - Build the axum `Router` with request-id, tracing and a 404 fallback
//! - Turn an HTTP request into a `RequestContext` (path params, query, body, client IP)
//! - Run the endpoint pipeline and render its outcome
//! - Serve on a listener until the shutdown signal fires, sweeping idle rate limit
//!   buckets in the background
//!
//! # Design Decisions
//! - Route table is fixed once `router()` is called; registration happens at startup
//! - Path parameter types are checked before the pipeline; a mismatch is a 422
//! - The auth delegate and subject resolver are late-bound, so they may be set
//!   before or after groups are registered

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, FromRequestParts, Path, Request},
    http::{header, HeaderName, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::http::context::RequestContext;
use crate::http::envelope::{render_rejection, render_status};
use crate::http::request::{request_id_middleware, RequestId};
use crate::lifecycle::shutdown;
use crate::observability::{metrics, tracing::trace_layer};
use crate::pipeline::{Pipeline, PipelineServices, SubjectResolver, VersioningSettings};
use crate::routing::{route_shape, EndpointDescriptor, RouteGroup};
use crate::security::{run_sweeper, AuthDelegate};

/// One registered endpoint with its composed pipeline.
#[derive(Debug)]
struct RouteEntry {
    descriptor: EndpointDescriptor,
    pipeline: Pipeline,
    requires_auth: bool,
}

/// Request-independent settings the dispatcher needs.
#[derive(Debug, Clone, Copy)]
struct EdgeSettings {
    envelope: bool,
    max_body_size: usize,
}

/// An application: registered groups, shared stores and configuration.
#[derive(Debug)]
pub struct App {
    config: AppConfig,
    services: PipelineServices,
    routes: Vec<Arc<RouteEntry>>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let services = PipelineServices::default().with_versioning(versioning_settings(&config));
        Self {
            config,
            services,
            routes: Vec::new(),
        }
    }

    /// Use another clock for the cache and rate limiter.
    ///
    /// The auth delegate, subject resolver and cache store are kept. Groups already
    /// registered keep the previous clock, so call this before `register`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.services = self.services.with_clock(clock);
        self
    }

    /// Replace the shared stores. Call before registering groups.
    pub fn with_services(mut self, services: PipelineServices) -> Self {
        self.services = services;
        self
    }

    pub fn set_auth_delegate(&self, delegate: Arc<dyn AuthDelegate>) {
        self.services.auth.set(delegate);
    }

    pub fn with_auth_delegate(self, delegate: Arc<dyn AuthDelegate>) -> Self {
        self.set_auth_delegate(delegate);
        self
    }

    pub fn set_subject_resolver(&self, resolver: SubjectResolver) {
        self.services.set_subject_resolver(resolver);
    }

    pub fn with_subject_resolver(self, resolver: SubjectResolver) -> Self {
        self.set_subject_resolver(resolver);
        self
    }

    /// Register every endpoint of a group.
    ///
    /// Nothing is registered when any endpoint fails to compose or collides with an
    /// existing route. Templates that differ only in placeholder names collide too.
    pub fn register(&mut self, group: RouteGroup) -> Result<&mut Self, ConfigError> {
        let mut staged: Vec<RouteEntry> = Vec::new();
        for endpoint in group.compile() {
            let registered = self
                .routes
                .iter()
                .map(|r| &r.descriptor)
                .chain(staged.iter().map(|r| &r.descriptor));
            check_collision(registered, &endpoint.descriptor)?;

            let pipeline = Pipeline::compose(
                &endpoint.descriptor,
                &endpoint.policy,
                endpoint.handler,
                &self.services,
            )?;
            staged.push(RouteEntry {
                requires_auth: endpoint.policy.requires_auth(),
                descriptor: endpoint.descriptor,
                pipeline,
            });
        }

        for entry in &staged {
            tracing::debug!(
                method = %entry.descriptor.method(),
                path = %entry.descriptor.path(),
                handler = %entry.descriptor.handler(),
                wrappers = ?entry.pipeline.wrapper_names(),
                "Registered endpoint"
            );
        }
        tracing::info!(group = %group.name(), endpoints = staged.len(), "Registered route group");
        self.routes.extend(staged.into_iter().map(Arc::new));
        Ok(self)
    }

    /// Descriptors of every registered endpoint, in registration order.
    pub fn registered_routes(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.routes.iter().map(|r| &r.descriptor)
    }

    /// Drop rate limit buckets with no request inside their window.
    pub fn sweep_rate_limits(&self) -> usize {
        self.services.limiter.sweep()
    }

    /// Drop cached responses whose keys match a glob pattern.
    pub fn invalidate_cache(&self, pattern: &str) -> Result<usize, ConfigError> {
        let removed = self.services.cache.invalidate(pattern)?;
        tracing::info!(pattern = %pattern, removed, "Cache invalidated");
        Ok(removed)
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build the axum router for every registered endpoint.
    pub fn router(&self) -> Router {
        if !self.services.auth.is_set() {
            for route in self.routes.iter().filter(|r| r.requires_auth) {
                tracing::error!(
                    handler = %route.descriptor.handler(),
                    "Authentication is enabled but no delegate is registered"
                );
            }
        }

        let settings = EdgeSettings {
            envelope: self.config.errors.envelope,
            max_body_size: self.config.limits.max_body_size,
        };

        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for route in &self.routes {
            let filter = match MethodFilter::try_from(route.descriptor.method().clone()) {
                Ok(filter) => filter,
                Err(_) => {
                    tracing::warn!(
                        method = %route.descriptor.method(),
                        "Method cannot be routed, endpoint skipped"
                    );
                    continue;
                }
            };

            let path = route.descriptor.path().to_string();
            let entry = route.clone();
            let method_router = by_path.remove(&path).unwrap_or_else(MethodRouter::new);
            by_path.insert(
                path,
                method_router.on(filter, move |req: Request| dispatch(entry, settings, req)),
            );
        }

        let router = by_path
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            });

        router
            .fallback(move |req: Request| not_found(settings, req))
            .layer(trace_layer())
            .layer(middleware::from_fn(request_id_middleware))
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.routes.len(), "HTTP server starting");

        let sweeper = tokio::spawn(run_sweeper(
            self.services.limiter.clone(),
            Duration::from_secs(self.config.limits.rate_limit_sweep_secs.max(1)),
            shutdown.resubscribe(),
        ));

        let service = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, service)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await;

        sweeper.abort();
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Reject a route the router could not add next to `registered`.
fn check_collision<'a>(
    mut registered: impl Iterator<Item = &'a EndpointDescriptor>,
    candidate: &EndpointDescriptor,
) -> Result<(), ConfigError> {
    let shape = route_shape(candidate.path());
    let clash = registered.find(|d| {
        route_shape(d.path()) == shape
            && (d.path() != candidate.path() || d.method() == candidate.method())
    });

    match clash {
        None => Ok(()),
        Some(existing) if existing.path() == candidate.path() => Err(ConfigError::DuplicateRoute {
            method: candidate.method().clone(),
            path: candidate.path().to_string(),
            existing: existing.handler().to_string(),
            duplicate: candidate.handler().to_string(),
        }),
        Some(existing) => Err(ConfigError::ConflictingRoute {
            path: candidate.path().to_string(),
            existing_path: existing.path().to_string(),
            existing: existing.handler().to_string(),
            duplicate: candidate.handler().to_string(),
        }),
    }
}

fn versioning_settings(config: &AppConfig) -> VersioningSettings {
    let default = VersioningSettings::default();
    let header = HeaderName::try_from(config.versioning.header.as_str()).unwrap_or_else(|_| {
        tracing::warn!(
            header = %config.versioning.header,
            "Invalid version header name, using X-API-Version"
        );
        default.header.clone()
    });
    VersioningSettings {
        strict: config.versioning.strict,
        header,
    }
}

fn request_id_of(req: &Request) -> RequestId {
    req.extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::generate)
}

async fn not_found(settings: EdgeSettings, req: Request) -> Response {
    let request_id = request_id_of(&req);
    render_status(
        StatusCode::NOT_FOUND,
        "Not Found",
        request_id.as_str(),
        settings.envelope,
    )
}

async fn dispatch(route: Arc<RouteEntry>, settings: EdgeSettings, req: Request) -> Response {
    let start = Instant::now();
    let descriptor = &route.descriptor;
    let method = descriptor.method().as_str();
    let request_id = request_id_of(&req);

    let response = match build_context(descriptor, settings, request_id.clone(), req).await {
        Ok(ctx) => match route.pipeline.run(ctx).await {
            Ok(response) => response.into_response(),
            Err(rejection) => {
                if rejection.status().is_server_error() {
                    tracing::error!(
                        request_id = %request_id,
                        handler = %descriptor.handler(),
                        error = %rejection,
                        "Request failed"
                    );
                }
                render_rejection(rejection, request_id.as_str(), settings.envelope)
            }
        },
        Err(response) => response,
    };

    metrics::record_request(method, descriptor.path(), response.status().as_u16(), start);
    response
}

/// Extract everything the pipeline needs, or the error response to send instead.
async fn build_context(
    descriptor: &EndpointDescriptor,
    settings: EdgeSettings,
    request_id: RequestId,
    req: Request,
) -> Result<RequestContext, Response> {
    let reject = |status: StatusCode, message: String| {
        render_status(status, message, request_id.as_str(), settings.envelope)
    };

    let (mut parts, body) = req.into_parts();

    let path_params = if descriptor.params().is_empty() {
        BTreeMap::new()
    } else {
        match Path::<BTreeMap<String, String>>::from_request_parts(&mut parts, &()).await {
            Ok(Path(params)) => params,
            Err(e) => return Err(reject(StatusCode::UNPROCESSABLE_ENTITY, e.body_text())),
        }
    };
    descriptor
        .check_params(&path_params)
        .map_err(|message| reject(StatusCode::UNPROCESSABLE_ENTITY, message))?;

    let too_large = || {
        reject(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request body exceeds {} bytes", settings.max_body_size),
        )
    };
    let declared_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_length.is_some_and(|len| len > settings.max_body_size) {
        return Err(too_large());
    }
    let body = to_bytes(body, settings.max_body_size)
        .await
        .map_err(|_| too_large())?;

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let mut builder = RequestContext::builder(parts.method.clone(), parts.uri.path())
        .request_id(request_id.clone())
        .route(descriptor.path())
        .handler(descriptor.handler())
        .query(parts.uri.query().unwrap_or_default())
        .path_params(path_params)
        .body(body);
    if let Some(ip) = client_ip {
        builder = builder.client_ip(ip);
    }

    Ok(builder.headers(parts.headers).build())
}
