use async_trait::async_trait;

use crate::http::RequestContext;
use crate::pipeline::{Flow, Next, RetryOptions, Wrapper};
use crate::resilience::RetryExecutor;

/// Re-runs the inner chain when the handler fails with a retryable error.
///
/// Only handler failures are candidates; denials raised further in never reach here
/// because every denying wrapper sits outside this one.
pub struct RetryWrapper {
    options: RetryOptions,
}

impl RetryWrapper {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Wrapper for RetryWrapper {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        let retryable = &self.options.retryable;

        RetryExecutor::new(self.options.policy.clone())
            .named(ctx.handler())
            .execute(
                || next.run(ctx.clone()),
                |rejection| rejection.as_upstream().is_some_and(|err| retryable(err)),
            )
            .await
    }
}
