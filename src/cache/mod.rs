//! Shared cache layer.
//!
//! Defines the `CacheBackend` trait used by the fundamentals cache, the
//! scan results store and the scan lock, plus an in-memory TTL
//! implementation. Every backend call is fallible so callers can degrade
//! to their documented defaults when the cache is unreachable.

pub mod fundamentals;
pub mod results;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::WatchError;

/// Key/value store with per-entry expiry.
pub trait CacheBackend: Send + Sync {
    /// Fetch a live (unexpired) entry.
    fn get(&self, key: &str) -> Result<Option<Value>, WatchError>;

    /// Store an entry, replacing any existing one.
    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), WatchError>;

    /// Store an entry only if no live entry exists. Returns `true` if stored.
    /// Must be atomic with respect to concurrent callers.
    fn add(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, WatchError>;

    /// Replace a live entry only if it still equals `expected`. Returns
    /// `true` if replaced. Must be atomic with respect to concurrent callers.
    fn compare_and_set(
        &self,
        key: &str,
        expected: &Value,
        value: Value,
        ttl: Duration,
    ) -> Result<bool, WatchError>;

    /// Remove an entry. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), WatchError>;

    /// Drop expired entries, returning how many went. Backends that expire
    /// entries themselves keep the default.
    fn evict_expired(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Process-local TTL cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> WatchError {
        WatchError::CacheUnavailable("memory cache lock poisoned".to_string())
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, WatchError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        let now = Utc::now();
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), WatchError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    fn add(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, WatchError> {
        // Check and insert under one write lock.
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let now = Utc::now();
        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: &Value,
        value: Value,
        ttl: Duration,
    ) -> Result<bool, WatchError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let now = Utc::now();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) && entry.value == *expected => {
                entry.value = value;
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, key: &str) -> Result<(), WatchError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn evict_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
