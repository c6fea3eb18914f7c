//! Time-bounded advisory lock on top of the cache backend.
//!
//! `acquire` is an atomic set-if-absent with a TTL, so a crashed holder
//! cannot block scans forever: the marker simply expires. The returned
//! guard releases on drop. Release only removes the marker if it still
//! carries the holder's token, so a holder that outlived its TTL cannot
//! delete a newer holder's marker.

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheBackend;

pub const DEFAULT_LOCK_TTL_MINUTES: i64 = 30;

#[derive(Clone)]
pub struct ScanLock {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl ScanLock {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    fn key(name: &str) -> String {
        format!("lock:{name}")
    }

    /// Try to take the named lock. `None` if it is held, or if the cache
    /// cannot be reached (fail closed).
    pub fn acquire(&self, name: &str) -> Option<ScanLockGuard> {
        let key = Self::key(name);
        let token = Uuid::new_v4();

        match self.backend.add(&key, json!(token.to_string()), self.ttl) {
            Ok(true) => {
                debug!(lock = name, %token, "Lock acquired");
                Some(ScanLockGuard {
                    backend: self.backend.clone(),
                    key,
                    token,
                    released: false,
                })
            }
            Ok(false) => {
                debug!(lock = name, "Lock already held");
                None
            }
            Err(e) => {
                warn!(lock = name, error = %e, "Lock backend unavailable, refusing to acquire");
                None
            }
        }
    }

    /// Whether a live marker exists. A cache outage reads as not held.
    pub fn is_held(&self, name: &str) -> bool {
        matches!(self.backend.get(&Self::key(name)), Ok(Some(_)))
    }
}

/// Scoped ownership of a lock; dropping it releases the lock.
pub struct ScanLockGuard {
    backend: Arc<dyn CacheBackend>,
    key: String,
    token: Uuid,
    released: bool,
}

impl ScanLockGuard {
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Release now. Idempotent, and a no-op if the marker already expired.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match self.backend.get(&self.key) {
            Ok(Some(value)) if value.as_str() == Some(self.token.to_string().as_str()) => {
                if let Err(e) = self.backend.delete(&self.key) {
                    warn!(key = %self.key, error = %e, "Failed to release lock, it will expire");
                } else {
                    debug!(key = %self.key, "Lock released");
                }
            }
            Ok(_) => debug!(key = %self.key, "Lock marker gone or taken over, nothing to release"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to read lock on release, it will expire"),
        }
    }
}

impl Drop for ScanLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
