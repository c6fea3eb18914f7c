//! Short-lived store for the latest scan output.
//!
//! Holds the per-security option results and the scan run state. Writes
//! that fail are logged and dropped; reads never fail. A missing,
//! unreadable or wrong-shaped payload is replaced by a typed empty
//! default so consumers never see raw cache contents.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::CacheBackend;
use crate::types::{ScanResults, ScanRunState, ScanStatus};

pub const DEFAULT_RESULTS_TTL_MINUTES: i64 = 45;

const RESULTS_KEY: &str = "scan:results";
const STATUS_KEY: &str = "scan:status";

/// What a consumer sees when polling for scan progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanView {
    pub status: ScanRunState,
    pub results: ScanResults,
}

#[derive(Clone)]
pub struct ResultsCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

enum Read<T> {
    Found(T),
    Missing,
    Unavailable,
}

impl ResultsCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_ttl(backend, Duration::minutes(DEFAULT_RESULTS_TTL_MINUTES))
    }

    pub fn with_ttl(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn write_results(&self, results: &ScanResults) {
        self.write(RESULTS_KEY, results);
    }

    pub fn write_status(&self, state: &ScanRunState) {
        self.write(STATUS_KEY, state);
    }

    /// Note a turned-away trigger on the live run's status. Only a `Running`
    /// state with a run id that is unchanged since it was read gets the new
    /// message; a finished or missing run is left as it is.
    pub fn note_rejected_trigger(&self, message: &str) -> bool {
        let raw = match self.backend.get(STATUS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Scan status unreadable, rejection not recorded");
                return false;
            }
        };
        let Ok(mut state) = serde_json::from_value::<ScanRunState>(raw.clone()) else {
            return false;
        };
        if state.status != ScanStatus::Running || state.run_id.is_none() {
            return false;
        }

        state.message = message.to_string();
        let payload = match serde_json::to_value(&state) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to serialise scan status");
                return false;
            }
        };
        match self.backend.compare_and_set(STATUS_KEY, &raw, payload, self.ttl) {
            Ok(swapped) => swapped,
            Err(e) => {
                warn!(error = %e, "Failed to record rejected scan trigger");
                false
            }
        }
    }

    /// Latest per-security results, or an empty mapping.
    pub fn latest_results(&self) -> ScanResults {
        match self.read::<ScanResults>(RESULTS_KEY) {
            Read::Found(results) => results,
            Read::Missing | Read::Unavailable => ScanResults::new(),
        }
    }

    /// Current run state: "Never" if nothing was written, "unavailable" if
    /// the cache could not be read or held something unexpected.
    pub fn status(&self) -> ScanRunState {
        match self.read::<ScanRunState>(STATUS_KEY) {
            Read::Found(state) => state,
            Read::Missing => ScanRunState::never(),
            Read::Unavailable => ScanRunState::unavailable(),
        }
    }

    pub fn view(&self) -> ScanView {
        ScanView {
            status: self.status(),
            results: self.latest_results(),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialise scan payload");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, payload, self.ttl) {
            warn!(key, error = %e, "Failed to write scan payload to cache");
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Read<T> {
        match self.backend.get(key) {
            Ok(Some(payload)) => match serde_json::from_value::<T>(payload) {
                Ok(value) => Read::Found(value),
                Err(e) => {
                    warn!(key, error = %e, "Scan payload has unexpected shape, using default");
                    Read::Unavailable
                }
            },
            Ok(None) => Read::Missing,
            Err(e) => {
                warn!(key, error = %e, "Scan results cache unreadable, using default");
                Read::Unavailable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
