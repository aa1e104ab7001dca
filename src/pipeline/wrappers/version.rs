use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};

use crate::error::ConfigError;
use crate::http::RequestContext;
use crate::pipeline::{Flow, Next, Rejection, VersionOptions, VersioningSettings, Wrapper};

use super::{annotate, deprecation_headers};

/// Enforces the client's declared API version against a constraint.
pub struct VersionWrapper {
    options: VersionOptions,
    settings: VersioningSettings,
    deprecation: Option<HeaderMap>,
}

impl VersionWrapper {
    pub fn new(options: VersionOptions, settings: VersioningSettings) -> Result<Self, ConfigError> {
        let deprecation = if options.deprecated {
            Some(deprecation_headers(
                options.sunset.as_deref(),
                options.message.as_deref(),
                None,
            )?)
        } else {
            None
        };
        Ok(Self {
            options,
            settings,
            deprecation,
        })
    }

    fn incompatible(&self, client_version: &str) -> Rejection {
        let constraint = self.options.constraint.to_string();
        let message = self
            .options
            .message
            .clone()
            .unwrap_or_else(|| format!("This endpoint requires API version {}", constraint));

        Rejection::denied(StatusCode::BAD_REQUEST, "version_incompatible", message)
            .with_detail("your_version", client_version)
            .with_detail("required", constraint)
    }
}

#[async_trait]
impl Wrapper for VersionWrapper {
    fn name(&self) -> &'static str {
        "version"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        let client_version = ctx
            .header(self.settings.header.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        match client_version.as_deref() {
            None if self.settings.strict => {
                tracing::debug!(handler = %ctx.handler(), "Missing API version header");
                return Err(Rejection::denied(
                    StatusCode::BAD_REQUEST,
                    "version_required",
                    format!(
                        "API version required. Provide the {} header.",
                        self.settings.header
                    ),
                )
                .with_detail("required", self.options.constraint.to_string()));
            }
            Some(version) if !self.options.constraint.check(version) => {
                tracing::debug!(
                    handler = %ctx.handler(),
                    client_version = version,
                    required = %self.options.constraint,
                    "Incompatible API version"
                );
                return Err(self.incompatible(version));
            }
            _ => {}
        }

        let handler = ctx.handler().to_string();
        let flow = next.run(ctx).await;

        match &self.deprecation {
            Some(headers) => {
                tracing::warn!(
                    handler = %handler,
                    message = self.options.message.as_deref(),
                    sunset = self.options.sunset.as_deref(),
                    "Deprecated API version in use"
                );
                annotate(flow, headers)
            }
            None => flow,
        }
    }
}
