//! routeweave demo server.
//!
//! Registers a few route groups showing the wrapper set and serves them until
//! SIGINT/SIGTERM.
//!
//! ```text
//! GET    /users             cached, rate limited per client
//! GET    /users/{id}        typed param, version-gated, cached per id
//! POST   /users             admin only, call/return logged
//! DELETE /users/{id}        admin only, deprecated
//! GET    /reports/summary   blocking handler under a deadline, timed
//! GET    /catalog/items     retried on 503
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use routeweave::config::{load_config, AppConfig};
use routeweave::endpoint;
use routeweave::lifecycle::{signals, startup, Shutdown};
use routeweave::pipeline::{
    AuthOptions, CacheOptions, DeprecationOptions, LogOptions, RateLimitOptions, RetryOptions,
    SpeedOptions, TimeoutOptions, VersionOptions,
};
use routeweave::routing::ParamType;
use routeweave::security::{AuthError, AuthRequirement, FnAuthDelegate, RateLimitBy};
use routeweave::{ApiResponse, App, HandlerError, HandlerResult, RequestContext, RouteGroup};

#[derive(Parser)]
#[command(name = "routeweave")]
#[command(about = "Demo server for convention-routed endpoints", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

async fn get(_ctx: RequestContext) -> HandlerResult {
    Ok(ApiResponse::json(json!({
        "users": [
            { "id": 1, "name": "ada" },
            { "id": 2, "name": "grace" }
        ]
    })))
}

async fn get_by_id(ctx: RequestContext) -> HandlerResult {
    let id: u64 = ctx.path_param_as("id")?;
    match id {
        1 => Ok(ApiResponse::json(json!({ "id": 1, "name": "ada" }))),
        2 => Ok(ApiResponse::json(json!({ "id": 2, "name": "grace" }))),
        _ => Err(HandlerError::not_found(format!("User {} not found", id))),
    }
}

async fn post(ctx: RequestContext) -> HandlerResult {
    let body: serde_json::Value = ctx.json_body()?;
    Ok(ApiResponse::json(json!({ "created": true, "user": body }))
        .with_status(axum::http::StatusCode::CREATED))
}

async fn delete_by_id(_ctx: RequestContext) -> HandlerResult {
    Ok(ApiResponse::no_content())
}

fn get_summary(_ctx: RequestContext) -> HandlerResult {
    std::thread::sleep(Duration::from_millis(150));
    Ok(ApiResponse::json(json!({ "total_users": 2, "active": 1 })))
}

static CATALOG_CALLS: AtomicU32 = AtomicU32::new(0);

async fn get_items(_ctx: RequestContext) -> HandlerResult {
    if CATALOG_CALLS.fetch_add(1, Ordering::SeqCst) % 3 == 0 {
        return Err(HandlerError::unavailable("Catalog backend warming up"));
    }
    Ok(ApiResponse::json(json!({ "items": ["widget", "gadget"] })))
}

fn demo_groups() -> Result<Vec<RouteGroup>, routeweave::ConfigError> {
    let admin = || AuthOptions::new().roles(["admin"]);

    let users = RouteGroup::new("Users")
        .endpoint(
            endpoint!(get)
                .rate_limit(RateLimitOptions::new(60, Duration::from_secs(60)))
                .cache(
                    CacheOptions::new(Duration::from_secs(30))
                        .stale_while_revalidate(Duration::from_secs(30)),
                ),
        )
        .endpoint(
            endpoint!(get_by_id)
                .param("id", ParamType::Integer)
                .version(VersionOptions::new(">=1.0")?)
                .cache(CacheOptions::new(Duration::from_secs(60)).key("users:{id}")?),
        )
        .endpoint(endpoint!(post).auth(admin()).log(LogOptions::new()))
        .endpoint(
            endpoint!(delete_by_id)
                .param("id", ParamType::Integer)
                .deprecated(
                    DeprecationOptions::new()
                        .alternative("/users/{id}/archive")
                        .sunset("2027-01-01"),
                )
                .rate_limit(RateLimitOptions::new(10, Duration::from_secs(60)).by(RateLimitBy::User))
                .auth(admin()),
        );

    let reports = RouteGroup::new("Reports").endpoint(
        endpoint!(get_summary, blocking)
            .timeout(TimeoutOptions::new(Duration::from_secs(2)))
            .speed(
                SpeedOptions::new()
                    .warn_after(Duration::from_millis(100))
                    .error_after(Duration::from_secs(1))
                    .include_in_response(),
            ),
    );

    let catalog = RouteGroup::new("Catalog").endpoint(
        endpoint!(get_items)
            .retry(
                RetryOptions::new(3, Duration::from_millis(50), 2.0)
                    .retry_if(|err| err.status() == axum::http::StatusCode::SERVICE_UNAVAILABLE),
            )
            .timeout(TimeoutOptions::new(Duration::from_secs(5))),
    );

    Ok(vec![users, reports, catalog])
}

/// Bearer tokens of the form `<role>-token` grant that role.
async fn authorize(ctx: RequestContext, requirement: AuthRequirement) -> Result<bool, AuthError> {
    let Some(token) = ctx
        .header("authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
    else {
        return Err(AuthError::unauthenticated("Missing bearer token"));
    };

    let roles: Vec<&str> = match token {
        "admin-token" => vec!["admin", "user"],
        "user-token" => vec!["user"],
        _ => return Err(AuthError::unauthenticated("Unknown token")),
    };
    let scopes: [&str; 0] = [];
    Ok(requirement.is_satisfied_by(roles.as_slice(), &scopes))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    startup::init_observability(&config)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        strict_versioning = config.versioning.strict,
        "routeweave starting"
    );

    let mut app = App::new(config.clone())
        .with_auth_delegate(Arc::new(FnAuthDelegate::new(authorize)));
    for group in demo_groups()? {
        app.register(group)?;
    }

    let listener = startup::bind_listener(&config).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));
    app.serve(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
