//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (requests, latency, denials, cache outcomes)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `routeweave_requests_total` (counter): requests by method, route, status
//! - `routeweave_handler_duration_seconds` (histogram): pipeline latency by route
//! - `routeweave_rate_limited_total` (counter): rate limit denials by handler
//! - `routeweave_cache_lookups_total` (counter): lookups by handler and outcome
//! - `routeweave_retries_total` (counter): retry waits by handler
//! - `routeweave_timeouts_total` (counter): timed-out invocations by handler
//! - `routeweave_auth_denied_total` (counter): auth rejections by handler and reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an exporter it is free
//! - Labels are low-cardinality: route templates, never concrete paths

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        "routeweave_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("routeweave_handler_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(handler: &str) {
    counter!("routeweave_rate_limited_total", "handler" => handler.to_string()).increment(1);
}

pub fn record_cache_lookup(handler: &str, outcome: &'static str) {
    counter!(
        "routeweave_cache_lookups_total",
        "handler" => handler.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(handler: &str) {
    counter!("routeweave_retries_total", "handler" => handler.to_string()).increment(1);
}

pub fn record_timeout(handler: &str) {
    counter!("routeweave_timeouts_total", "handler" => handler.to_string()).increment(1);
}

pub fn record_auth_denied(handler: &str, reason: &'static str) {
    counter!(
        "routeweave_auth_denied_total",
        "handler" => handler.to_string(),
        "reason" => reason
    )
    .increment(1);
}
