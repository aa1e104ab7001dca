use async_trait::async_trait;
use axum::http::StatusCode;

use crate::error::{code_for_status, ConfigError};
use crate::http::RequestContext;
use crate::observability::metrics;
use crate::pipeline::{AuthOptions, Flow, Next, Rejection, Wrapper};
use crate::security::{AuthError, AuthSlot};

const DEFAULT_DENIAL: &str = "Not authenticated";

/// Delegates the capability check to the app's registered auth delegate.
pub struct AuthWrapper {
    options: AuthOptions,
    slot: AuthSlot,
}

impl AuthWrapper {
    pub fn new(options: AuthOptions, slot: AuthSlot) -> Self {
        Self { options, slot }
    }

    fn deny(&self, ctx: &RequestContext, status: StatusCode, reason: Option<String>) -> Rejection {
        metrics::record_auth_denied(ctx.handler(), "denied");
        let message = reason
            .filter(|r| !r.is_empty())
            .or_else(|| self.options.error_message.clone())
            .unwrap_or_else(|| DEFAULT_DENIAL.to_string());
        Rejection::denied(status, code_for_status(status), message)
    }
}

#[async_trait]
impl Wrapper for AuthWrapper {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        if !self.options.enabled {
            return next.run(ctx).await;
        }

        let Some(delegate) = self.slot.get() else {
            tracing::error!(
                handler = %ctx.handler(),
                "Authentication is enabled but no delegate is registered"
            );
            metrics::record_auth_denied(ctx.handler(), "misconfigured");
            return Err(Rejection::misconfigured(ConfigError::MissingAuthDelegate));
        };

        match delegate.authorize(&ctx, &self.options.requirement).await {
            Ok(true) => next.run(ctx).await,
            Ok(false) => {
                tracing::debug!(handler = %ctx.handler(), "Auth delegate denied request");
                Err(self.deny(&ctx, StatusCode::FORBIDDEN, None))
            }
            Err(AuthError::Denied { status, reason }) => {
                tracing::debug!(
                    handler = %ctx.handler(),
                    status = status.as_u16(),
                    reason = %reason,
                    "Auth delegate denied request"
                );
                Err(self.deny(&ctx, status, Some(reason)))
            }
            Err(AuthError::Failed(cause)) => {
                tracing::error!(handler = %ctx.handler(), error = %cause, "Auth delegate failed");
                metrics::record_auth_denied(ctx.handler(), "error");
                Err(Rejection::internal("Internal authentication error"))
            }
        }
    }
}
