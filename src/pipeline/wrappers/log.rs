use async_trait::async_trait;

use crate::cache::canonical_query;
use crate::http::{ApiResponse, RequestContext, ResponseBody};
use crate::pipeline::{Flow, LogLevel, LogOptions, Next, Wrapper};

/// Emit one event at a level chosen at runtime.
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
            LogLevel::Warning => tracing::warn!($($arg)+),
            LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// Call/return events around the handler.
pub struct LogWrapper {
    options: LogOptions,
}

impl LogWrapper {
    pub fn new(options: LogOptions) -> Self {
        Self { options }
    }

    fn prefix(&self) -> &str {
        self.options.message.as_deref().unwrap_or("")
    }

    fn describe_args(&self, ctx: &RequestContext) -> String {
        let params: Vec<String> = ctx
            .path_params()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let args = format!(
            "params=[{}] query=[{}]",
            params.join(", "),
            canonical_query(ctx.query())
        );
        truncate(&args, self.options.max_length)
    }

    fn describe_result(&self, response: &ApiResponse) -> String {
        let body = match response.body() {
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Empty => String::new(),
        };
        truncate(
            &format!("status={} body={}", response.status().as_u16(), body),
            self.options.max_length,
        )
    }
}

#[async_trait]
impl Wrapper for LogWrapper {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Flow {
        let handler = ctx.handler().to_string();
        let prefix = self.prefix();
        let level = self.options.level;

        if self.options.include_args {
            let args = self.describe_args(&ctx);
            event_at!(level, prefix, handler = %handler, args = %args, "Handler call");
        } else {
            event_at!(level, prefix, handler = %handler, "Handler call");
        }

        let flow = next.run(ctx).await;

        match &flow {
            Ok(response) if self.options.include_result => {
                let result = self.describe_result(response);
                event_at!(level, prefix, handler = %handler, result = %result, "Handler return");
            }
            Ok(_) => {}
            Err(rejection) => {
                tracing::error!(
                    prefix,
                    handler = %handler,
                    status = rejection.status().as_u16(),
                    code = rejection.code(),
                    error = %rejection.message(),
                    "Handler error"
                );
            }
        }

        flow
    }
}

/// Cut `text` to at most `max_length` characters, marking the cut with `...`.
fn truncate(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééééé", 2), "éé...");
        assert_eq!(truncate("", 0), "");
    }
}
