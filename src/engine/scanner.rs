//! Put-option scan over the watch list.
//!
//! One pass fetches the live put chain for every active security (one
//! provider call at a time), checks each chain against the security's
//! effective intrinsic value and publishes the aggregated results plus a
//! run state to the results cache. Passes are mutually exclusive through
//! the scan lock; a trigger while a pass is running is rejected, never
//! queued. Progress is observed only by polling the results cache.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lock::{ScanLock, ScanLockGuard};
use crate::cache::results::ResultsCache;
use crate::market_data::MarketDataProvider;
use crate::storage::Storage;
use crate::types::{
    OptionContractResult, PutOption, ScanAck, ScanResults, ScanRunState, ScanStatus,
    SecurityScanResult, WatchedSecurity,
};

pub const SCAN_LOCK_NAME: &str = "scan";
pub const ALREADY_RUNNING_MESSAGE: &str = "Scan already running";

pub struct ScanOrchestrator {
    storage: Storage,
    provider: Arc<dyn MarketDataProvider>,
    results: ResultsCache,
    lock: ScanLock,
    max_contracts: usize,
}

/// Tally of one scan pass.
#[derive(Debug, Default)]
struct PassTally {
    scanned: usize,
    upstream_failures: usize,
}

impl ScanOrchestrator {
    pub fn new(
        storage: Storage,
        provider: Arc<dyn MarketDataProvider>,
        results: ResultsCache,
        lock: ScanLock,
        max_contracts: usize,
    ) -> Self {
        Self {
            storage,
            provider,
            results,
            lock,
            max_contracts: max_contracts.max(1),
        }
    }

    /// Start a pass in the background and return immediately.
    pub fn trigger_scan(self: &Arc<Self>) -> ScanAck {
        let Some(guard) = self.start() else {
            return ScanAck::AlreadyRunning;
        };

        let run_id = guard.token();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(run_id, guard).await;
        });
        ScanAck::Accepted { run_id }
    }

    /// Run a pass to completion on the current task.
    pub async fn run_scan(&self) -> ScanAck {
        let Some(guard) = self.start() else {
            return ScanAck::AlreadyRunning;
        };
        let run_id = guard.token();
        self.execute(run_id, guard).await;
        ScanAck::Accepted { run_id }
    }

    /// Take the lock and mark the run as started, or record the rejection.
    fn start(&self) -> Option<ScanLockGuard> {
        match self.lock.acquire(SCAN_LOCK_NAME) {
            Some(guard) => {
                self.results.write_status(&ScanRunState::now(
                    ScanStatus::Running,
                    "Scan started",
                    Some(guard.token()),
                ));
                info!(run_id = %guard.token(), "Scan started");
                Some(guard)
            }
            None => {
                info!("Scan trigger rejected, a scan is already running");
                self.results.note_rejected_trigger(ALREADY_RUNNING_MESSAGE);
                None
            }
        }
    }

    async fn execute(&self, run_id: Uuid, mut guard: ScanLockGuard) {
        let state = match self.storage.list_active_securities().await {
            Ok(securities) => self.scan_all(run_id, &securities).await,
            Err(e) => {
                warn!(%run_id, error = %e, "Failed to load watch list, scan aborted");
                self.results.write_results(&ScanResults::new());
                ScanRunState::now(
                    ScanStatus::Failed,
                    format!("Scan failed: could not load watch list ({e})"),
                    Some(run_id),
                )
            }
        };

        self.results.write_status(&state);
        info!(%run_id, status = %state.status, message = %state.message, "Scan finished");
        guard.release();
    }

    async fn scan_all(&self, run_id: Uuid, securities: &[WatchedSecurity]) -> ScanRunState {
        let mut results = ScanResults::new();
        let mut tally = PassTally::default();

        for security in securities {
            match self.provider.fetch_put_options(&security.symbol).await {
                Ok(puts) => {
                    let result = evaluate_chain(security, puts, self.max_contracts);
                    debug!(
                        symbol = %security.symbol,
                        contracts = result.contracts.len(),
                        qualifying = result.qualifying_contracts,
                        passes = result.passes,
                        "Security scanned"
                    );
                    tally.scanned += 1;
                    results.insert(security.symbol.clone(), result);
                }
                Err(e) => {
                    warn!(symbol = %security.symbol, error = %e, "Option chain unavailable, skipping");
                    tally.upstream_failures += 1;
                }
            }
        }

        let total = securities.len();
        if total > 0 && tally.upstream_failures == total {
            self.results.write_results(&ScanResults::new());
            return ScanRunState::now(
                ScanStatus::Failed,
                format!("Scan failed: market data unavailable for all {total} securities"),
                Some(run_id),
            );
        }

        let passing = results.values().filter(|r| r.passes).count();
        self.results.write_results(&results);
        ScanRunState::now(
            ScanStatus::Completed,
            format!(
                "Scanned {} of {} securities ({} skipped, {} passing)",
                tally.scanned, total, tally.upstream_failures, passing
            ),
            Some(run_id),
        )
    }
}

/// Build a security's scan result from its live put chain.
///
/// A contract qualifies when its strike is at or below the effective
/// intrinsic value. Reported contracts are sorted by strike, highest first,
/// and capped at `max_contracts`.
pub fn evaluate_chain(
    security: &WatchedSecurity,
    mut puts: Vec<PutOption>,
    max_contracts: usize,
) -> SecurityScanResult {
    let intrinsic_value = security.effective_intrinsic_value();

    let qualifying_contracts = match intrinsic_value {
        Some(iv) => puts.iter().filter(|p| p.strike <= iv).count(),
        None => 0,
    };

    puts.sort_by(|a, b| b.strike.total_cmp(&a.strike).then(a.expiration.cmp(&b.expiration)));
    let contracts = puts
        .into_iter()
        .take(max_contracts)
        .map(|p| OptionContractResult {
            symbol: security.symbol.clone(),
            strike: p.strike,
            premium: p.premium,
            expiration: p.expiration,
        })
        .collect();

    SecurityScanResult {
        symbol: security.symbol.clone(),
        intrinsic_value,
        contracts,
        qualifying_contracts,
        passes: qualifying_contracts > 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
