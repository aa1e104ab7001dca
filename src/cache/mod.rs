//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → key.rs (default key or rendered key template)
//!     → store.rs lookup(key, now)
//!         Fresh  → serve entry (304 when If-None-Match matches etag.rs)
//!         Stale  → serve entry, no background refresh
//!         Miss   → run handler, store cacheable result
//! ```
//!
//! # Design Decisions
//! - Backends are injected as `Arc<dyn CacheBackend>`; the in-memory store is the default
//! - Entries are replaced wholesale on recompute, never merged
//! - `stale_until >= expires_at` holds by construction
//! - Invalidation is a single critical section over the whole key set

pub mod etag;
pub mod key;
pub mod store;

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::ConfigError;

pub use etag::{canonical_json, compute_etag, etag_matches};
pub use key::{canonical_query, default_key, KeyTemplate, Vary};
pub use store::MemoryCacheStore;

/// A stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Value,
    status: StatusCode,
    content_type: Option<String>,
    headers: HeaderMap,
    expires_at: Instant,
    stale_until: Instant,
    etag: String,
}

impl CacheEntry {
    /// Build an entry stored at `now`, fresh for `ttl` and then stale for `stale_for`.
    pub fn new(
        value: Value,
        status: StatusCode,
        content_type: Option<String>,
        headers: HeaderMap,
        now: Instant,
        ttl: Duration,
        stale_for: Duration,
    ) -> Self {
        let expires_at = now + ttl;
        let etag = compute_etag(&value);
        Self {
            value,
            status,
            content_type,
            headers,
            expires_at,
            stale_until: expires_at + stale_for,
            etag,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn stale_until(&self) -> Instant {
        self.stale_until
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn freshness(&self, now: Instant) -> Freshness {
        if now < self.expires_at {
            Freshness::Fresh
        } else if now < self.stale_until {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Result of a cache read.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Miss,
}

impl CacheLookup {
    pub fn outcome(&self) -> &'static str {
        match self {
            CacheLookup::Fresh(_) => "fresh",
            CacheLookup::Stale(_) => "stale",
            CacheLookup::Miss => "miss",
        }
    }
}

/// Key/entry storage shared by every cached endpoint.
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store an entry, replacing any previous one for the key.
    fn put(&self, key: String, entry: CacheEntry);

    /// Remove every key matching a glob pattern and return how many were removed.
    fn invalidate(&self, pattern: &str) -> Result<usize, ConfigError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an entry and classify it against `now`.
    fn lookup(&self, key: &str, now: Instant) -> CacheLookup {
        match self.get(key) {
            Some(entry) => match entry.freshness(now) {
                Freshness::Fresh => CacheLookup::Fresh(entry),
                Freshness::Stale => CacheLookup::Stale(entry),
                Freshness::Expired => CacheLookup::Miss,
            },
            None => CacheLookup::Miss,
        }
    }
}
