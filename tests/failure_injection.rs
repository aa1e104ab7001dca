//! Failure injection: flaky handlers, slow handlers and broken auth delegates.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use routeweave::pipeline::{AuthOptions, RetryOptions, TimeoutOptions};
use routeweave::security::{AuthError, AuthRequirement, FnAuthDelegate};
use routeweave::{
    ApiResponse, App, Endpoint, Handler, HandlerError, HandlerResult, RequestContext, RouteGroup,
};

mod common;

/// Handler that fails with `error` for the first `failures` calls.
fn flaky(failures: u32, error: fn() -> HandlerError) -> (Handler, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let handler = Handler::new(move |_ctx| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < failures {
                return Err(error());
            }
            Ok(ApiResponse::json(json!({ "status": "recovered" })))
        }
    });
    (handler, calls)
}

fn unavailable() -> HandlerError {
    HandlerError::unavailable("Service Unavailable")
}

fn bad_request() -> HandlerError {
    HandlerError::from_status(StatusCode::BAD_REQUEST, "bad input")
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_failures() {
    let (handler, calls) = flaky(2, unavailable);
    let mut app = App::new(common::config());
    app.register(RouteGroup::new("Jobs").endpoint(
        Endpoint::new("get", handler).retry(RetryOptions::new(3, Duration::from_millis(100), 2.0)),
    ))
    .unwrap();
    let router = app.router();

    let started = tokio::time::Instant::now();
    let response = common::get(&router, "/jobs", &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_returns_last_error() {
    let (handler, calls) = flaky(10, unavailable);
    let mut app = App::new(common::config());
    app.register(RouteGroup::new("Jobs").endpoint(
        Endpoint::new("get", handler).retry(RetryOptions::new(3, Duration::from_millis(10), 2.0)),
    ))
    .unwrap();
    let router = app.router();

    let response = common::get(&router, "/jobs", &[]).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["error"]["code"], "service_unavailable");
    assert_eq!(response.body["error"]["message"], "Service Unavailable");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_is_not_retried() {
    let (handler, calls) = flaky(10, bad_request);
    let mut app = App::new(common::config());
    app.register(
        RouteGroup::new("Jobs").endpoint(
            Endpoint::new("get", handler).retry(
                RetryOptions::new(5, Duration::from_millis(10), 2.0)
                    .retry_if(|err| err.is_server_error()),
            ),
        ),
    )
    .unwrap();
    let router = app.router();

    let response = common::get(&router, "/jobs", &[]).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn slow(_ctx: RequestContext) -> HandlerResult {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Ok(ApiResponse::json(json!({ "late": true })))
}

#[tokio::test(start_paused = true)]
async fn test_timeout_yields_504() {
    let mut app = App::new(common::config());
    app.register(RouteGroup::new("Jobs").endpoint(
        Endpoint::new("get", Handler::new(slow)).timeout(TimeoutOptions::new(Duration::from_secs(1))),
    ))
    .unwrap();
    let router = app.router();

    let response = common::get(&router, "/jobs", &[]).await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.body["error"]["code"], "timeout");
    assert_eq!(response.body["error"]["timeout_secs"], json!(1.0));
    assert_eq!(
        response.body["error"]["message"],
        "Request timed out after 1 seconds"
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_retry_backoff() {
    let (handler, calls) = flaky(10, unavailable);
    let mut app = App::new(common::config());
    app.register(
        RouteGroup::new("Jobs").endpoint(
            Endpoint::new("get", handler)
                .timeout(TimeoutOptions::new(Duration::from_secs(2)))
                .retry(RetryOptions::new(5, Duration::from_secs(10), 2.0)),
        ),
    )
    .unwrap();
    let router = app.router();

    let response = common::get(&router, "/jobs", &[]).await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blocking_handler_deadline_enforced() {
    let handler = Handler::blocking(|_ctx| {
        std::thread::sleep(Duration::from_millis(400));
        Ok(ApiResponse::json(json!({ "done": true })))
    });
    let mut app = App::new(common::config());
    app.register(RouteGroup::new("Reports").endpoint(
        Endpoint::new("get", handler).timeout(
            TimeoutOptions::new(Duration::from_millis(50)).message("Report took too long"),
        ),
    ))
    .unwrap();
    let router = app.router();

    let started = std::time::Instant::now();
    let response = common::get(&router, "/reports", &[]).await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.body["error"]["message"], "Report took too long");
    assert!(started.elapsed() < Duration::from_millis(400));
}

fn guarded_app() -> (App, Arc<AtomicU32>) {
    let (handler, calls) = common::counting_handler(json!({ "secret": 42 }));
    let mut app = App::new(common::config());
    app.register(
        RouteGroup::new("Vault")
            .endpoint(Endpoint::new("get", handler).auth(AuthOptions::new().roles(["admin"]))),
    )
    .unwrap();
    (app, calls)
}

#[tokio::test]
async fn test_auth_without_delegate_is_500() {
    let (app, calls) = guarded_app();
    let router = app.router();

    let response = common::get(&router, "/vault", &[]).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["error"]["code"], "configuration_error");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_auth_delegate_decisions() {
    let (app, calls) = guarded_app();
    app.set_auth_delegate(Arc::new(FnAuthDelegate::new(
        |ctx: RequestContext, requirement: AuthRequirement| async move {
            match ctx.header("authorization") {
                Some("Bearer admin") => Ok(requirement.is_satisfied_by(&["admin"], &[] as &[&str])),
                Some("Bearer user") => Ok(requirement.is_satisfied_by(&["user"], &[] as &[&str])),
                Some("Bearer crash") => Err(AuthError::Failed("token store offline".into())),
                Some("Bearer revoked") => Err(AuthError::denied("Token revoked")),
                _ => Err(AuthError::unauthenticated("Missing credentials")),
            }
        },
    )));
    let router = app.router();

    let admin = common::get(&router, "/vault", &[("authorization", "Bearer admin")]).await;
    assert_eq!(admin.status, StatusCode::OK);

    let user = common::get(&router, "/vault", &[("authorization", "Bearer user")]).await;
    assert_eq!(user.status, StatusCode::FORBIDDEN);
    assert_eq!(user.body["error"]["code"], "forbidden");
    assert_eq!(user.body["error"]["message"], "Not authenticated");

    let anonymous = common::get(&router, "/vault", &[]).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["error"]["code"], "auth_required");
    assert_eq!(anonymous.body["error"]["message"], "Missing credentials");

    let revoked = common::get(&router, "/vault", &[("authorization", "Bearer revoked")]).await;
    assert_eq!(revoked.status, StatusCode::FORBIDDEN);
    assert_eq!(revoked.body["error"]["code"], "forbidden");
    assert_eq!(revoked.body["error"]["message"], "Token revoked");

    let broken = common::get(&router, "/vault", &[("authorization", "Bearer crash")]).await;
    assert_eq!(broken.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(broken.body["error"]["code"], "internal_error");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
