//! Cache key derivation.
//!
//! # Responsibilities
//! - Default keys: `METHOD|path|sorted query|handler` plus selected header values
//! - Custom key templates with `{method}`, `{path}`, path parameters and `{h_<header>}`
//!
//! # Design Decisions
//! - Query pairs are sorted, so parameter order never changes the key
//! - Query pairs are form-encoded and `|` is escaped in paths and header values, so
//!   no value can forge a separator
//! - Templates are parsed when the endpoint is declared; unknown placeholders fail fast
//! - A header placeholder whose header is absent renders as an empty string

use std::fmt;
use std::str::FromStr;

use axum::http::HeaderName;

use crate::error::ConfigError;
use crate::http::RequestContext;

const HEADER_PREFIX: &str = "h_";

/// Form-encoded query string with pairs sorted by key, then value.
pub fn canonical_query(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<_> = pairs.iter().collect();
    sorted.sort();
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(sorted)
        .finish()
}

/// Escape the key separator in a free-form component.
fn escape_component(raw: &str) -> String {
    raw.replace('%', "%25").replace('|', "%7C")
}

/// One entry of a cache `vary` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vary {
    /// Query parameters; always part of the default key.
    Query,
    /// Value of a request header (`headers:<Name>`).
    Header(HeaderName),
}

impl FromStr for Vary {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "query" {
            return Ok(Vary::Query);
        }
        s.strip_prefix("headers:")
            .and_then(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
            .map(Vary::Header)
            .ok_or_else(|| ConfigError::InvalidVary(s.to_string()))
    }
}

impl fmt::Display for Vary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vary::Query => f.write_str("query"),
            Vary::Header(name) => write!(f, "headers:{}", name),
        }
    }
}

/// Default cache key for a request.
pub fn default_key(ctx: &RequestContext, vary: &[Vary]) -> String {
    let mut key = format!(
        "{}|{}|{}|{}",
        ctx.method().as_str(),
        escape_component(ctx.path()),
        canonical_query(ctx.query()),
        ctx.handler()
    );

    for item in vary {
        if let Vary::Header(name) = item {
            let value = ctx.header(name.as_str()).unwrap_or_default();
            key.push_str(&format!("|h:{}={}", name, escape_component(value)));
        }
    }

    key
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed custom key template such as `users:{id}:{h_accept_language}`.
#[derive(Debug, Clone)]
pub struct KeyTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl KeyTemplate {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidKeyTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(invalid("nested `{`")),
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(invalid("unclosed `{`"));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                '}' => return Err(invalid("unmatched `}`")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if segments.is_empty() {
            return Err(invalid("template is empty"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Check every placeholder resolves for an endpoint with these path parameters.
    pub fn validate<'a>(
        &self,
        path_params: impl IntoIterator<Item = &'a str> + Clone,
    ) -> Result<(), ConfigError> {
        for name in self.placeholders() {
            let known = matches!(name, "method" | "path")
                || name.starts_with(HEADER_PREFIX)
                || path_params.clone().into_iter().any(|p| p == name);
            if !known {
                return Err(ConfigError::InvalidKeyTemplate {
                    template: self.raw.clone(),
                    reason: format!("unknown placeholder `{{{}}}`", name),
                });
            }
        }
        Ok(())
    }

    pub fn render(&self, ctx: &RequestContext) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => out.push_str(&resolve(name, ctx)),
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for KeyTemplate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn resolve(name: &str, ctx: &RequestContext) -> String {
    match name {
        "method" => ctx.method().as_str().to_lowercase(),
        "path" => ctx.path().to_string(),
        _ => {
            if let Some(param) = ctx.path_param(name) {
                return param.to_string();
            }
            name.strip_prefix(HEADER_PREFIX)
                .and_then(|header| ctx.header(&header.replace('_', "-")))
                .unwrap_or_default()
                .to_string()
        }
    }
}
