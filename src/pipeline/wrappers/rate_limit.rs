use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};

use crate::http::RequestContext;
use crate::observability::metrics;
use crate::pipeline::{Flow, Next, PipelineServices, RateLimitOptions, Rejection, Wrapper};
use crate::security::{bucket_key, RateDecision, RateLimitBy};

use super::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

/// Sliding-window admission per client, user or endpoint.
pub struct RateLimitWrapper {
    options: RateLimitOptions,
    services: PipelineServices,
}

impl RateLimitWrapper {
    pub fn new(options: RateLimitOptions, services: PipelineServices) -> Self {
        Self { options, services }
    }

    fn key_for(&self, ctx: &RequestContext) -> String {
        let subject = match self.options.by {
            RateLimitBy::Ip => ctx.client_ip().map(|ip| ip.to_string()),
            RateLimitBy::User => self.services.resolve_subject(ctx),
            RateLimitBy::Global => None,
        };
        bucket_key(self.options.by, ctx.handler(), subject.as_deref())
    }

    fn deny(&self, ctx: &RequestContext, decision: RateDecision) -> Rejection {
        let message = self.options.message.clone().unwrap_or_else(|| {
            format!(
                "Rate limit exceeded. Try again in {} seconds.",
                decision.reset_secs
            )
        });

        tracing::warn!(
            handler = %ctx.handler(),
            by = %self.options.by,
            limit = decision.limit,
            retry_after = decision.reset_secs,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(ctx.handler());

        Rejection::denied(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message)
            .with_detail("retry_after", decision.reset_secs)
            .with_header(header::RETRY_AFTER, HeaderValue::from(decision.reset_secs))
            .with_header(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit))
            .with_header(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"))
            .with_header(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_secs))
    }
}

#[async_trait]
impl Wrapper for RateLimitWrapper {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        let key = self.key_for(&ctx);
        let decision = self
            .services
            .limiter
            .check(&key, self.options.limit, self.options.window);

        if !decision.allowed {
            return Err(self.deny(&ctx, decision));
        }

        let mut response = next.run(ctx).await?;
        let headers = response.headers_mut();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_secs));
        Ok(response)
    }
}
