use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::error::ConfigError;
use crate::http::RequestContext;
use crate::pipeline::{DeprecationOptions, Flow, Next, Wrapper};

use super::{annotate, deprecation_headers};

/// Marks an endpoint deprecated: warns on every call and annotates every outcome.
pub struct DeprecationWrapper {
    options: DeprecationOptions,
    headers: HeaderMap,
}

impl DeprecationWrapper {
    pub fn new(options: &DeprecationOptions) -> Result<Self, ConfigError> {
        let headers = deprecation_headers(
            options.sunset.as_deref(),
            Some(options.message.as_str()),
            options.alternative.as_deref(),
        )?;
        Ok(Self {
            options: options.clone(),
            headers,
        })
    }
}

#[async_trait]
impl Wrapper for DeprecationWrapper {
    fn name(&self) -> &'static str {
        "deprecation"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        tracing::warn!(
            handler = %ctx.handler(),
            message = %self.options.message,
            alternative = self.options.alternative.as_deref(),
            sunset = self.options.sunset.as_deref(),
            "Deprecated endpoint called"
        );

        annotate(next.run(ctx).await, &self.headers)
    }
}
