use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderValue;
use tokio::time::Instant;

use crate::http::RequestContext;
use crate::pipeline::{Flow, Next, SpeedOptions, Wrapper};

use super::X_RESPONSE_TIME;

/// Times the handler and grades the duration against the configured thresholds.
pub struct SpeedWrapper {
    options: SpeedOptions,
}

impl SpeedWrapper {
    pub fn new(options: SpeedOptions) -> Self {
        Self { options }
    }

    fn report(&self, handler: &str, elapsed: Duration, failed: bool) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let exceeds = |threshold: Option<Duration>| threshold.is_some_and(|t| elapsed > t);

        if exceeds(self.options.error_threshold) {
            tracing::error!(handler, elapsed_ms, failed, "Handler exceeded error threshold");
        } else if exceeds(self.options.warn_threshold) {
            tracing::warn!(handler, elapsed_ms, failed, "Handler exceeded warning threshold");
        } else {
            tracing::info!(handler, elapsed_ms, failed, "Handler timing");
        }
    }
}

#[async_trait]
impl Wrapper for SpeedWrapper {
    fn name(&self) -> &'static str {
        "speed"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        let handler = ctx.handler().to_string();
        let start = Instant::now();
        let flow = next.run(ctx).await;
        let elapsed = start.elapsed();

        self.report(&handler, elapsed, flow.is_err());

        let mut response = flow?;
        if self.options.include_in_response {
            let formatted = format!("{:.2}ms", elapsed.as_secs_f64() * 1000.0);
            if let Ok(value) = HeaderValue::from_str(&formatted) {
                response.headers_mut().insert(X_RESPONSE_TIME, value);
            }
        }
        Ok(response)
    }
}
