//! User handler adapter.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::HandlerError;
use crate::http::{ApiResponse, RequestContext};

/// What a handler produces.
pub type HandlerResult = Result<ApiResponse, HandlerError>;

type HandlerFn = dyn Fn(RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Type-erased endpoint handler.
///
/// Async handlers run on the request task. Blocking handlers run on Tokio's blocking
/// pool; a timeout around them answers on time but cannot stop the worker thread.
#[derive(Clone)]
pub struct Handler {
    call: Arc<HandlerFn>,
    blocking: bool,
}

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            call: Arc::new(move |ctx: RequestContext| f(ctx).boxed()),
            blocking: false,
        }
    }

    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self {
            call: Arc::new(move |ctx: RequestContext| {
                let f = f.clone();
                async move {
                    tokio::task::spawn_blocking(move || f(ctx))
                        .await
                        .map_err(|e| HandlerError::internal("Blocking handler failed").with_source(e))?
                }
                .boxed()
            }),
            blocking: true,
        }
    }

    pub fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        (self.call)(ctx)
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("blocking", &self.blocking)
            .finish()
    }
}
