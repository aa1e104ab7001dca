use async_trait::async_trait;

use crate::http::RequestContext;
use crate::observability::metrics;
use crate::pipeline::{Flow, Next, Rejection, TimeoutOptions, Wrapper};
use crate::resilience::{run_with_timeout, TimeoutOutcome};

/// Bounds the inner chain by a deadline; the inner future is dropped when it passes.
pub struct TimeoutWrapper {
    options: TimeoutOptions,
}

impl TimeoutWrapper {
    pub fn new(options: TimeoutOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Wrapper for TimeoutWrapper {
    fn name(&self) -> &'static str {
        "timeout"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        let handler = ctx.handler().to_string();

        match run_with_timeout(self.options.duration, next.run(ctx)).await {
            TimeoutOutcome::Completed(flow) => flow,
            TimeoutOutcome::TimedOut { after } => {
                tracing::error!(
                    handler = %handler,
                    timeout_secs = after.as_secs_f64(),
                    "Handler timed out"
                );
                metrics::record_timeout(&handler);

                let message = self.options.message.clone().unwrap_or_else(|| {
                    format!("Request timed out after {} seconds", after.as_secs_f64())
                });
                Err(Rejection::timed_out(after, message))
            }
        }
    }
}
