use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

use crate::cache::{default_key, etag_matches, CacheBackend, CacheEntry, CacheLookup, Vary};
use crate::clock::Clock;
use crate::http::{ApiResponse, RequestContext, ResponseBody};
use crate::observability::metrics;
use crate::pipeline::{CacheOptions, Flow, Next, Wrapper};

use super::X_RESPONSE_TIME;

const CACHEABLE_STATUSES: [StatusCode; 3] = [
    StatusCode::OK,
    StatusCode::NON_AUTHORITATIVE_INFORMATION,
    StatusCode::NO_CONTENT,
];

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Serves fresh or stale entries without running the inner chain; stores cacheable misses.
pub struct CacheWrapper {
    options: CacheOptions,
    store: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    cache_control: HeaderValue,
    vary: Option<HeaderValue>,
}

impl CacheWrapper {
    pub fn new(options: CacheOptions, store: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        let cache_control = HeaderValue::from_str(&format!(
            "public, max-age={}, stale-while-revalidate={}",
            options.ttl.as_secs(),
            options.stale_while_revalidate.as_secs()
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("public"));

        // Header names are always valid header values.
        let names: Vec<&str> = options
            .vary
            .iter()
            .filter_map(|v| match v {
                Vary::Header(name) => Some(name.as_str()),
                Vary::Query => None,
            })
            .collect();
        let vary = (!names.is_empty())
            .then(|| HeaderValue::from_str(&names.join(", ")).ok())
            .flatten();

        Self {
            options,
            store,
            clock,
            cache_control,
            vary,
        }
    }

    fn key_for(&self, ctx: &RequestContext) -> String {
        match &self.options.key {
            Some(template) => template.render(ctx),
            None => default_key(ctx, &self.options.vary),
        }
    }

    fn is_cacheable(&self, status: StatusCode) -> bool {
        self.options.cache_errors || CACHEABLE_STATUSES.contains(&status)
    }

    fn serve_hit(&self, ctx: &RequestContext, entry: &CacheEntry) -> ApiResponse {
        let etag = HeaderValue::from_str(entry.etag()).ok();
        let cache_control = entry
            .headers()
            .get(header::CACHE_CONTROL)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("public"));

        let not_modified = ctx
            .header(header::IF_NONE_MATCH.as_str())
            .is_some_and(|candidates| etag_matches(candidates, entry.etag()));

        let mut response = if not_modified {
            ApiResponse::not_modified()
        } else {
            rebuild(entry)
        };

        let headers = response.headers_mut();
        if let Some(etag) = etag {
            headers.insert(header::ETAG, etag);
        }
        headers.insert(header::CACHE_CONTROL, cache_control);
        response
    }

    fn store(&self, key: String, response: &mut ApiResponse) {
        let (value, content_type) = match response.body() {
            ResponseBody::Json(value) => (value.clone(), Some(JSON_CONTENT_TYPE.to_string())),
            ResponseBody::Text(text) => {
                (Value::String(text.clone()), Some(TEXT_CONTENT_TYPE.to_string()))
            }
            ResponseBody::Empty => (Value::Null, None),
        };

        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, self.cache_control.clone());
        if let Some(vary) = &self.vary {
            headers.insert(header::VARY, vary.clone());
        }

        let mut stored_headers: HeaderMap = headers.clone();
        stored_headers.remove(X_RESPONSE_TIME);

        let entry = CacheEntry::new(
            value,
            response.status(),
            content_type,
            stored_headers,
            self.clock.now(),
            self.options.ttl,
            self.options.stale_while_revalidate,
        );
        if let Ok(etag) = HeaderValue::from_str(entry.etag()) {
            response.headers_mut().insert(header::ETAG, etag);
        }
        self.store.put(key, entry);
    }
}

#[async_trait]
impl Wrapper for CacheWrapper {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        if self.options.ttl.is_zero() {
            metrics::record_cache_lookup(ctx.handler(), "bypass");
            return next.run(ctx).await;
        }

        let key = self.key_for(&ctx);
        let lookup = self.store.lookup(&key, self.clock.now());
        metrics::record_cache_lookup(ctx.handler(), lookup.outcome());
        tracing::debug!(
            handler = %ctx.handler(),
            key = %key,
            outcome = lookup.outcome(),
            "Cache lookup"
        );

        match lookup {
            CacheLookup::Fresh(entry) | CacheLookup::Stale(entry) => Ok(self.serve_hit(&ctx, &entry)),
            CacheLookup::Miss => {
                let mut response = next.run(ctx).await?;
                if self.is_cacheable(response.status()) {
                    self.store(key, &mut response);
                }
                Ok(response)
            }
        }
    }
}

fn rebuild(entry: &CacheEntry) -> ApiResponse {
    let body = match (entry.content_type(), entry.value()) {
        (Some(content_type), Value::String(text)) if content_type.starts_with("text/") => {
            ResponseBody::Text(text.clone())
        }
        (None, Value::Null) => ResponseBody::Empty,
        (_, value) => ResponseBody::Json(value.clone()),
    };

    let mut response = ApiResponse::new(entry.status(), body);
    response.headers_mut().extend(entry.headers().clone());
    response
}
