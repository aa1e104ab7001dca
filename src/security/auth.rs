//! Authentication delegate contract.
//!
//! # Responsibilities
//! - Describe what an endpoint requires (roles, scopes, all-or-any)
//! - Define the delegate the embedding application registers
//! - Hold the delegate in a slot resolved per request, so registration order does not matter
//!
//! # Design Decisions
//! - The crate never inspects credentials; the delegate sees the request context
//! - `Ok(false)` is a 403; `AuthError::Denied` carries its own status (403 unless the
//!   delegate says 401); `AuthError::Failed` is a 500
//! - An empty slot is a configuration error, never an implicit allow

use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::http::RequestContext;

/// Roles and scopes an endpoint demands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequirement {
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
    /// Require every listed role and scope instead of any one of each.
    pub require_all: bool,
}

impl AuthRequirement {
    /// Evaluate granted roles and scopes against this requirement.
    ///
    /// Empty requirement lists are always satisfied. Delegates may use this or apply
    /// their own policy.
    pub fn is_satisfied_by<R, S>(&self, granted_roles: &[R], granted_scopes: &[S]) -> bool
    where
        R: AsRef<str>,
        S: AsRef<str>,
    {
        let check = |required: &[String], granted: &[&str]| {
            if required.is_empty() {
                return true;
            }
            let mut hits = required.iter().map(|r| granted.contains(&r.as_str()));
            if self.require_all {
                hits.all(|hit| hit)
            } else {
                hits.any(|hit| hit)
            }
        };

        let roles: Vec<&str> = granted_roles.iter().map(AsRef::as_ref).collect();
        let scopes: Vec<&str> = granted_scopes.iter().map(AsRef::as_ref).collect();
        check(&self.roles, &roles) && check(&self.scopes, &scopes)
    }
}

/// Failure raised by a delegate.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Explicit denial with the status and reason shown to the client.
    #[error("{reason}")]
    Denied { status: StatusCode, reason: String },
    /// The delegate itself broke; surfaced as an internal error.
    #[error("authentication delegate failed: {0}")]
    Failed(String),
}

impl AuthError {
    /// Credentials were presented but do not grant access (403).
    pub fn denied(reason: impl Into<String>) -> Self {
        AuthError::Denied {
            status: StatusCode::FORBIDDEN,
            reason: reason.into(),
        }
    }

    /// No usable credentials were presented (401).
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        AuthError::Denied {
            status: StatusCode::UNAUTHORIZED,
            reason: reason.into(),
        }
    }
}

/// Capability check supplied by the application.
#[async_trait]
pub trait AuthDelegate: Send + Sync {
    async fn authorize(
        &self,
        ctx: &RequestContext,
        requirement: &AuthRequirement,
    ) -> Result<bool, AuthError>;
}

/// Delegate built from an async closure.
pub struct FnAuthDelegate<F> {
    f: F,
}

impl<F, Fut> FnAuthDelegate<F>
where
    F: Fn(RequestContext, AuthRequirement) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, AuthError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AuthDelegate for FnAuthDelegate<F>
where
    F: Fn(RequestContext, AuthRequirement) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, AuthError>> + Send,
{
    async fn authorize(
        &self,
        ctx: &RequestContext,
        requirement: &AuthRequirement,
    ) -> Result<bool, AuthError> {
        (self.f)(ctx.clone(), requirement.clone()).await
    }
}

/// Late-bound delegate registration shared by every auth wrapper of an app.
#[derive(Clone, Default)]
pub struct AuthSlot {
    delegate: Arc<RwLock<Option<Arc<dyn AuthDelegate>>>>,
}

impl AuthSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, delegate: Arc<dyn AuthDelegate>) {
        *self.delegate.write().expect("auth slot lock poisoned") = Some(delegate);
    }

    pub fn clear(&self) {
        *self.delegate.write().expect("auth slot lock poisoned") = None;
    }

    pub fn get(&self) -> Option<Arc<dyn AuthDelegate>> {
        self.delegate.read().expect("auth slot lock poisoned").clone()
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

impl fmt::Debug for AuthSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSlot")
            .field("registered", &self.is_set())
            .finish()
    }
}
