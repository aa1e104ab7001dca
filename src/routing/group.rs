//! Route groups and endpoint declarations.
//!
//! # Responsibilities
//! - Derive a group's base path from its name (or take an explicit override)
//! - Combine base path and derived sub-path into the full route template
//! - Attach declared parameter types and the wrapper policy to each endpoint
//! - Produce the immutable descriptor list handed to the app at registration
//!
//! # Design Decisions
//! - Registration is explicit; nothing is discovered at runtime
//! - Identifiers that are not endpoints are skipped, matching the deriver
//! - Every placeholder gets a type; undeclared ones default to `string`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use axum::http::Method;

use crate::pipeline::{
    AuthOptions, CacheOptions, DeprecationOptions, EndpointPolicy, Handler, LogOptions,
    RateLimitOptions, RetryOptions, SpeedOptions, TimeoutOptions, VersionOptions,
};
use crate::routing::deriver::{derive_route, path_placeholders};

/// Declared type of a path parameter, checked before the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    pub fn accepts(self, raw: &str) -> bool {
        match self {
            ParamType::String => true,
            ParamType::Integer => raw.parse::<i64>().is_ok(),
            ParamType::Number => raw.parse::<f64>().is_ok_and(f64::is_finite),
            ParamType::Boolean => matches!(raw, "true" | "false"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "str" => Ok(ParamType::String),
            "integer" | "int" => Ok(ParamType::Integer),
            "number" | "float" => Ok(ParamType::Number),
            "boolean" | "bool" => Ok(ParamType::Boolean),
            other => Err(format!("unknown parameter type `{}`", other)),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    method: Method,
    path: String,
    handler: String,
    params: BTreeMap<String, ParamType>,
}

impl EndpointDescriptor {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        handler: impl Into<String>,
        params: BTreeMap<String, ParamType>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            handler: handler.into(),
            params,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full route template, e.g. `/users/{id}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `Group.identifier`.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn params(&self) -> &BTreeMap<String, ParamType> {
        &self.params
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> + Clone {
        self.params.keys().map(String::as_str)
    }

    /// Check extracted path values against the declared types.
    pub fn check_params(&self, values: &BTreeMap<String, String>) -> Result<(), String> {
        for (name, kind) in &self.params {
            match values.get(name) {
                Some(raw) if kind.accepts(raw) => {}
                Some(raw) => {
                    return Err(format!(
                        "Path parameter `{}` must be {}, got `{}`",
                        name, kind, raw
                    ))
                }
                None => return Err(format!("Missing path parameter `{}`", name)),
            }
        }
        Ok(())
    }
}

/// One endpoint declaration inside a group.
#[derive(Debug, Clone)]
pub struct Endpoint {
    ident: String,
    handler: Handler,
    param_types: BTreeMap<String, ParamType>,
    policy: EndpointPolicy,
}

impl Endpoint {
    pub fn new(ident: impl Into<String>, handler: Handler) -> Self {
        Self {
            ident: ident.into(),
            handler,
            param_types: BTreeMap::new(),
            policy: EndpointPolicy::default(),
        }
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Declare the type of a path parameter.
    pub fn param(mut self, name: impl Into<String>, kind: ParamType) -> Self {
        self.param_types.insert(name.into(), kind);
        self
    }

    /// Replace the whole wrapper policy.
    pub fn policy(mut self, policy: EndpointPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn deprecated(mut self, options: DeprecationOptions) -> Self {
        self.policy.deprecated = Some(options);
        self
    }

    pub fn rate_limit(mut self, options: RateLimitOptions) -> Self {
        self.policy.rate_limit = Some(options);
        self
    }

    pub fn version(mut self, options: VersionOptions) -> Self {
        self.policy.version = Some(options);
        self
    }

    pub fn auth(mut self, options: AuthOptions) -> Self {
        self.policy.auth = Some(options);
        self
    }

    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.policy.cache = Some(options);
        self
    }

    pub fn timeout(mut self, options: TimeoutOptions) -> Self {
        self.policy.timeout = Some(options);
        self
    }

    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.policy.retry = Some(options);
        self
    }

    pub fn speed(mut self, options: SpeedOptions) -> Self {
        self.policy.speed = Some(options);
        self
    }

    pub fn log(mut self, options: LogOptions) -> Self {
        self.policy.log = Some(options);
        self
    }
}

/// An endpoint after route derivation, ready for pipeline composition.
#[derive(Debug, Clone)]
pub struct RegisteredEndpoint {
    pub descriptor: EndpointDescriptor,
    pub handler: Handler,
    pub policy: EndpointPolicy,
}

/// A named set of endpoints sharing a base path.
#[derive(Debug, Clone)]
pub struct RouteGroup {
    name: String,
    path: Option<String>,
    endpoints: Vec<Endpoint>,
}

impl RouteGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            endpoints: Vec::new(),
        }
    }

    /// Override the base path derived from the name.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `/` + override, or the kebab-case form of the name (`UserProfiles` → `/user-profiles`).
    pub fn base_path(&self) -> String {
        match &self.path {
            Some(path) if path.starts_with('/') => path.clone(),
            Some(path) => format!("/{}", path),
            None => format!("/{}", kebab_case(&self.name)),
        }
    }

    /// Derive every endpoint's route. Identifiers that are not endpoints are skipped.
    pub fn compile(&self) -> Vec<RegisteredEndpoint> {
        let base = self.base_path();

        self.endpoints
            .iter()
            .filter_map(|endpoint| {
                let Some((method, sub_path)) = derive_route(&endpoint.ident) else {
                    tracing::debug!(
                        group = %self.name,
                        ident = %endpoint.ident,
                        "Skipping identifier that is not an endpoint"
                    );
                    return None;
                };

                let full_path = if sub_path == "/" {
                    base.clone()
                } else {
                    format!("{}{}", base.trim_end_matches('/'), sub_path)
                };

                let params = path_placeholders(&full_path)
                    .into_iter()
                    .map(|name| {
                        let kind = endpoint.param_types.get(name).copied().unwrap_or_default();
                        (name.to_string(), kind)
                    })
                    .collect();

                Some(RegisteredEndpoint {
                    descriptor: EndpointDescriptor::new(
                        method,
                        full_path,
                        format!("{}.{}", self.name, endpoint.ident),
                        params,
                    ),
                    handler: endpoint.handler.clone(),
                    policy: endpoint.policy.clone(),
                })
            })
            .collect()
    }
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('-');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Declare an endpoint named after its handler function.
///
/// `endpoint!(get_by_id)` wraps an async handler; `endpoint!(get_report, blocking)`
/// runs a synchronous one on the blocking pool.
#[macro_export]
macro_rules! endpoint {
    ($handler:ident) => {
        $crate::routing::Endpoint::new(
            stringify!($handler),
            $crate::pipeline::Handler::new($handler),
        )
    };
    ($handler:ident, blocking) => {
        $crate::routing::Endpoint::new(
            stringify!($handler),
            $crate::pipeline::Handler::blocking($handler),
        )
    };
}
