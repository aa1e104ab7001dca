//! Endpoint pipeline tests driven through the axum router.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use serde_json::json;

use routeweave::cache::CacheBackend;
use routeweave::clock::ManualClock;
use routeweave::pipeline::{
    CacheOptions, DeprecationOptions, RateLimitOptions, VersionOptions,
};
use routeweave::routing::ParamType;
use routeweave::{ApiResponse, App, ConfigError, Endpoint, Handler, RouteGroup};

mod common;

fn items_group(handler: Handler, configure: impl FnOnce(Endpoint) -> Endpoint) -> RouteGroup {
    RouteGroup::new("Items").endpoint(configure(Endpoint::new("get", handler)))
}

#[tokio::test]
async fn test_query_order_shares_cache_entry() {
    let (handler, calls) = common::counting_handler(json!({ "items": [1, 2, 3] }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.cache(CacheOptions::new(Duration::from_secs(60)))
    }))
    .unwrap();
    let router = app.router();

    let first = common::get(&router, "/items?b=2&a=1", &[]).await;
    let second = common::get(&router, "/items?a=1&b=2", &[]).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body, json!({ "items": [1, 2, 3] }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.header("etag"), second.header("etag"));
    assert_eq!(
        first.header("cache-control"),
        Some("public, max-age=60, stale-while-revalidate=0")
    );
}

#[tokio::test]
async fn test_matching_etag_returns_not_modified() {
    let (handler, calls) = common::counting_handler(json!({ "name": "widget" }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.cache(CacheOptions::new(Duration::from_secs(60)))
    }))
    .unwrap();
    let router = app.router();

    let first = common::get(&router, "/items", &[]).await;
    let etag = first.header("etag").unwrap().to_string();

    let revalidated = common::get(&router, "/items", &[("if-none-match", &etag)]).await;
    assert_eq!(revalidated.status, StatusCode::NOT_MODIFIED);
    assert_eq!(revalidated.body, serde_json::Value::Null);
    assert_eq!(revalidated.header("etag"), Some(etag.as_str()));

    let other = common::get(&router, "/items", &[("if-none-match", "\"nope\"")]).await;
    assert_eq!(other.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_entry_served_until_window_closes() {
    let clock = ManualClock::new();
    let (handler, calls) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config()).with_clock(Arc::new(clock.clone()));
    app.register(items_group(handler, |e| {
        e.cache(
            CacheOptions::new(Duration::from_secs(10))
                .stale_while_revalidate(Duration::from_secs(10)),
        )
    }))
    .unwrap();
    let router = app.router();

    common::get(&router, "/items", &[]).await;
    clock.advance(Duration::from_secs(15));
    let stale = common::get(&router, "/items", &[]).await;
    assert_eq!(stale.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(10));
    common::get(&router, "/items", &[]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalidation_forces_recompute() {
    let (handler, calls) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.cache(CacheOptions::new(Duration::from_secs(60)))
    }))
    .unwrap();
    let router = app.router();

    common::get(&router, "/items", &[]).await;
    assert_eq!(app.invalidate_cache("nothing-matches-*").unwrap(), 0);
    common::get(&router, "/items", &[]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(app.invalidate_cache("*").unwrap(), 1);
    common::get(&router, "/items", &[]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_denial_carries_headers() {
    let (handler, calls) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.rate_limit(RateLimitOptions::new(2, Duration::from_secs(60)))
    }))
    .unwrap();
    let router = app.router();

    let first = common::get(&router, "/items", &[]).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.header("x-ratelimit-limit"), Some("2"));
    assert_eq!(first.header("x-ratelimit-remaining"), Some("1"));

    let second = common::get(&router, "/items", &[]).await;
    assert_eq!(second.header("x-ratelimit-remaining"), Some("0"));

    let denied = common::get(&router, "/items", &[]).await;
    assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.header("x-ratelimit-remaining"), Some("0"));
    let retry_after: u64 = denied.header("retry-after").unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert_eq!(denied.body["error"]["code"], "rate_limited");
    assert_eq!(denied.body["error"]["retry_after"], json!(retry_after));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_strict_versioning() {
    let mut config = common::config();
    config.versioning.strict = true;
    let (handler, _) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(config);
    app.register(items_group(handler, |e| {
        e.version(VersionOptions::new(">=2.0").unwrap())
    }))
    .unwrap();
    let router = app.router();

    let missing = common::get(&router, "/items", &[]).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["error"]["code"], "version_required");

    let old = common::get(&router, "/items", &[("x-api-version", "1.5")]).await;
    assert_eq!(old.status, StatusCode::BAD_REQUEST);
    assert_eq!(old.body["error"]["code"], "version_incompatible");
    assert_eq!(old.body["error"]["your_version"], "1.5");
    assert_eq!(old.body["error"]["required"], ">=2.0");

    let current = common::get(&router, "/items", &[("x-api-version", "2.1")]).await;
    assert_eq!(current.status, StatusCode::OK);
}

#[tokio::test]
async fn test_lenient_versioning_allows_missing_header() {
    let (handler, _) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.version(VersionOptions::new(">=2.0").unwrap().deprecated().sunset("2027-06-01"))
    }))
    .unwrap();
    let router = app.router();

    let response = common::get(&router, "/items", &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("deprecation"), Some("true"));
    assert_eq!(response.header("sunset"), Some("2027-06-01"));
}

#[tokio::test]
async fn test_deprecation_headers_on_success_and_denial() {
    let (handler, _) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config());
    app.register(
        RouteGroup::new("Items")
            .endpoint(Endpoint::new("get", handler.clone()).deprecated(
                DeprecationOptions::new()
                    .alternative("/v2/items")
                    .sunset("2027-01-01"),
            ))
            .endpoint(
                Endpoint::new("get_archived", handler)
                    .deprecated(DeprecationOptions::new())
                    .rate_limit(RateLimitOptions::new(1, Duration::from_secs(60))),
            ),
    )
    .unwrap();
    let router = app.router();

    let ok = common::get(&router, "/items", &[]).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.header("deprecation"), Some("true"));
    assert_eq!(ok.header("sunset"), Some("2027-01-01"));
    assert_eq!(ok.header("x-deprecation-alternative"), Some("/v2/items"));
    assert_eq!(
        ok.header("x-deprecation-message"),
        Some("This endpoint is deprecated")
    );

    common::get(&router, "/items/archived", &[]).await;
    let denied = common::get(&router, "/items/archived", &[]).await;
    assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.header("deprecation"), Some("true"));
}

#[tokio::test]
async fn test_handler_error_envelope_and_request_id() {
    let handler = Handler::new(|_ctx| async {
        Err(routeweave::HandlerError::not_found("Item 7 not found"))
    });
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| e)).unwrap();
    let router = app.router();

    let response = common::get(&router, "/items", &[("x-request-id", "  trace-42  ")]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.header("x-request-id"), Some("trace-42"));
    assert_eq!(response.body["error"]["code"], "not_found");
    assert_eq!(response.body["error"]["message"], "Item 7 not found");
    assert_eq!(response.body["request_id"], "trace-42");
    assert!(response.body["timestamp"].is_string());
}

#[tokio::test]
async fn test_flat_error_shape() {
    let mut config = common::config();
    config.errors.envelope = false;
    let handler = Handler::new(|_ctx| async {
        Err(routeweave::HandlerError::not_found("gone"))
    });
    let mut app = App::new(config);
    app.register(items_group(handler, |e| e)).unwrap();
    let router = app.router();

    let response = common::get(&router, "/items", &[]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, json!({ "detail": "gone" }));
}

#[tokio::test]
async fn test_unknown_route_is_enveloped_404() {
    let app = App::new(common::config());
    let router = app.router();

    let response = common::get(&router, "/missing", &[]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"]["code"], "not_found");

    let generated = response.header("x-request-id").unwrap();
    assert!(generated.starts_with("req_"));
    assert_eq!(response.body["request_id"], generated);
}

#[tokio::test]
async fn test_typed_path_param_mismatch_is_422() {
    let handler = Handler::new(|ctx: routeweave::RequestContext| async move {
        let id: u64 = ctx.path_param_as("id")?;
        Ok(ApiResponse::json(json!({ "id": id })))
    });
    let mut app = App::new(common::config());
    app.register(
        RouteGroup::new("Items")
            .endpoint(Endpoint::new("get_by_id", handler).param("id", ParamType::Integer)),
    )
    .unwrap();
    let router = app.router();

    let ok = common::get(&router, "/items/7", &[]).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body, json!({ "id": 7 }));

    let bad = common::get(&router, "/items/seven", &[]).await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(bad.body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = common::config();
    config.limits.max_body_size = 16;
    let handler = Handler::new(|ctx: routeweave::RequestContext| async move {
        let body: serde_json::Value = ctx.json_body()?;
        Ok(ApiResponse::json(body))
    });
    let mut app = App::new(config);
    app.register(RouteGroup::new("Items").endpoint(Endpoint::new("post", handler)))
        .unwrap();
    let router = app.router();

    let small = common::send(
        &router,
        common::request(Method::POST, "/items", &[], Body::from(r#"{"a":1}"#)),
    )
    .await;
    assert_eq!(small.status, StatusCode::OK);
    assert_eq!(small.body, json!({ "a": 1 }));

    let payload = format!(r#"{{"name":"{}"}}"#, "x".repeat(64));
    let large = common::send(
        &router,
        common::request(Method::POST, "/items", &[], Body::from(payload)),
    )
    .await;
    assert_eq!(large.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(large.body["error"]["code"], "payload_too_large");
}

#[tokio::test]
async fn test_duplicate_route_rejected_atomically() {
    let (first, _) = common::counting_handler(json!(1));
    let (second, _) = common::counting_handler(json!(2));
    let (third, _) = common::counting_handler(json!(3));

    let mut app = App::new(common::config());
    app.register(RouteGroup::new("Items").endpoint(Endpoint::new("get", first)))
        .unwrap();

    let err = app
        .register(
            RouteGroup::new("Catalog")
                .with_path("/items")
                .endpoint(Endpoint::new("post", third))
                .endpoint(Endpoint::new("get", second)),
        )
        .unwrap_err();

    assert!(matches!(err, ConfigError::DuplicateRoute { .. }));
    assert_eq!(app.registered_routes().count(), 1);
}

#[tokio::test]
async fn test_invalid_cache_template_fails_registration() {
    let (handler, _) = common::counting_handler(json!(1));
    let mut app = App::new(common::config());

    let err = app
        .register(items_group(handler, |e| {
            e.cache(CacheOptions::new(Duration::from_secs(5)).key("items:{id}").unwrap())
        }))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidKeyTemplate { .. }));
}

#[tokio::test]
async fn test_placeholder_renames_collide() {
    let (by_id, _) = common::counting_handler(json!({ "item": 7 }));
    let (by_user, _) = common::counting_handler(json!({ "deleted": true }));

    let mut app = App::new(common::config());
    let err = app
        .register(
            RouteGroup::new("Items")
                .endpoint(Endpoint::new("get_by_id", by_id.clone()))
                .endpoint(Endpoint::new("delete_by_user_id", by_user.clone())),
        )
        .unwrap_err();

    match err {
        ConfigError::ConflictingRoute {
            path,
            existing_path,
            existing,
            duplicate,
        } => {
            assert_eq!(path, "/items/{user_id}");
            assert_eq!(existing_path, "/items/{id}");
            assert_eq!(existing, "Items.get_by_id");
            assert_eq!(duplicate, "Items.delete_by_user_id");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(app.registered_routes().count(), 0);

    app.register(RouteGroup::new("Items").endpoint(Endpoint::new("get_by_id", by_id)))
        .unwrap();
    let err = app
        .register(RouteGroup::new("Items").endpoint(Endpoint::new("delete_by_user_id", by_user)))
        .unwrap_err();
    assert!(matches!(err, ConfigError::ConflictingRoute { .. }));
    assert_eq!(app.registered_routes().count(), 1);

    let router = app.router();
    let response = common::get(&router, "/items/7", &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "item": 7 }));
}

#[tokio::test]
async fn test_same_template_different_methods_coexist() {
    let (fetch, _) = common::counting_handler(json!({ "op": "get" }));
    let (remove, _) = common::counting_handler(json!({ "op": "delete" }));

    let mut app = App::new(common::config());
    app.register(
        RouteGroup::new("Items")
            .endpoint(Endpoint::new("get_by_id", fetch))
            .endpoint(Endpoint::new("delete_by_id", remove)),
    )
    .unwrap();
    let router = app.router();

    let removed = common::send(
        &router,
        common::request(Method::DELETE, "/items/3", &[], Body::empty()),
    )
    .await;
    assert_eq!(removed.body, json!({ "op": "delete" }));
}

#[tokio::test]
async fn test_idle_rate_limit_buckets_are_swept() {
    let clock = ManualClock::new();
    let (handler, _) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config()).with_clock(Arc::new(clock.clone()));
    app.register(items_group(handler, |e| {
        e.rate_limit(RateLimitOptions::new(1, Duration::from_secs(10)))
    }))
    .unwrap();
    let router = app.router();

    assert_eq!(common::get(&router, "/items", &[]).await.status, StatusCode::OK);
    assert_eq!(app.services().limiter.bucket_count(), 1);

    clock.advance(Duration::from_secs(5));
    assert_eq!(app.sweep_rate_limits(), 0);
    assert_eq!(
        common::get(&router, "/items", &[]).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );

    clock.advance(Duration::from_secs(6));
    assert_eq!(app.sweep_rate_limits(), 1);
    assert_eq!(app.services().limiter.bucket_count(), 0);
    assert_eq!(common::get(&router, "/items", &[]).await.status, StatusCode::OK);
}

/// Handler answering `Ok` with the given status and counting its invocations.
fn status_handler(status: StatusCode) -> (Handler, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let handler = Handler::new(move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse::json(json!({ "status": status.as_u16() })).with_status(status))
        }
    });
    (handler, calls)
}

#[tokio::test]
async fn test_zero_ttl_bypasses_cache() {
    let (handler, calls) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| e.cache(CacheOptions::new(Duration::ZERO))))
        .unwrap();
    let router = app.router();

    for _ in 0..3 {
        let response = common::get(&router, "/items", &[]).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("etag"), None);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_non_cacheable_statuses_are_not_stored() {
    for status in [StatusCode::CREATED, StatusCode::INTERNAL_SERVER_ERROR] {
        let (handler, calls) = status_handler(status);
        let mut app = App::new(common::config());
        app.register(items_group(handler, |e| {
            e.cache(CacheOptions::new(Duration::from_secs(60)))
        }))
        .unwrap();
        let router = app.router();

        assert_eq!(common::get(&router, "/items", &[]).await.status, status);
        assert_eq!(common::get(&router, "/items", &[]).await.status, status);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "status {status}");
        assert!(app.services().cache.is_empty());
    }
}

#[tokio::test]
async fn test_cache_errors_stores_any_status() {
    for status in [StatusCode::CREATED, StatusCode::INTERNAL_SERVER_ERROR] {
        let (handler, calls) = status_handler(status);
        let mut app = App::new(common::config());
        app.register(items_group(handler, |e| {
            e.cache(CacheOptions::new(Duration::from_secs(60)).cache_errors(true))
        }))
        .unwrap();
        let router = app.router();

        let first = common::get(&router, "/items", &[]).await;
        let second = common::get(&router, "/items", &[]).await;
        assert_eq!(first.status, status);
        assert_eq!(second.status, status);
        assert_eq!(second.body, json!({ "status": status.as_u16() }));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "status {status}");
    }
}

#[tokio::test]
async fn test_cached_hit_keeps_repeated_headers() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let handler = Handler::new(move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut response = ApiResponse::json(json!({ "ok": true }));
            let headers = response.headers_mut();
            headers.append(header::SET_COOKIE, HeaderValue::from_static("theme=dark"));
            headers.append(header::SET_COOKIE, HeaderValue::from_static("lang=en"));
            Ok(response)
        }
    });
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.cache(CacheOptions::new(Duration::from_secs(60)))
    }))
    .unwrap();
    let router = app.router();

    let first = common::get(&router, "/items", &[]).await;
    let second = common::get(&router, "/items", &[]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for response in [&first, &second] {
        let cookies: Vec<_> = response
            .headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, ["theme=dark", "lang=en"]);
    }
}

#[tokio::test]
async fn test_encoded_query_values_get_their_own_entry() {
    let (handler, calls) = common::counting_handler(json!({ "ok": true }));
    let mut app = App::new(common::config());
    app.register(items_group(handler, |e| {
        e.cache(CacheOptions::new(Duration::from_secs(60)))
    }))
    .unwrap();
    let router = app.router();

    common::get(&router, "/items?a=1%26b%3D2", &[]).await;
    common::get(&router, "/items?a=1&b=2", &[]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    common::get(&router, "/items?b=2&a=1", &[]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
