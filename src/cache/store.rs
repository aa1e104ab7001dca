//! In-memory cache store.

use std::collections::HashMap;
use std::sync::RwLock;

use glob::Pattern;

use crate::cache::{CacheBackend, CacheEntry};
use crate::error::ConfigError;

/// Process-local cache backed by a single `RwLock<HashMap>`.
///
/// Reads share the lock; writes and invalidation scans take it exclusively, so an
/// invalidation never interleaves with a concurrent `put`.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .expect("cache store lock poisoned")
            .get(key)
            .cloned()
    }

    fn put(&self, key: String, entry: CacheEntry) {
        self.entries
            .write()
            .expect("cache store lock poisoned")
            .insert(key, entry);
    }

    fn invalidate(&self, pattern: &str) -> Result<usize, ConfigError> {
        let matcher = Pattern::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut entries = self.entries.write().expect("cache store lock poisoned");
        let before = entries.len();
        entries.retain(|key, _| !matcher.matches(key));
        let removed = before - entries.len();

        tracing::debug!(pattern = %pattern, removed, "Cache invalidated");
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries.read().expect("cache store lock poisoned").len()
    }
}
