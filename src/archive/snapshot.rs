//! Quarterly valuation snapshots.
//!
//! A snapshot freezes a security's current pipeline values and the
//! assumptions in force for one period. Snapshots are append-only and
//! unique per (symbol, period); `force` is the only way to replace one.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::period::resolve_period;
use crate::storage::{InsertOutcome, Storage};
use crate::types::{SnapshotOutcome, ValuationSnapshot, WatchedSecurity};

/// Parameters for a batch snapshot run.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRequest {
    /// Explicit period for backfill; defaults to the current quarter start.
    pub date: Option<NaiveDate>,
    /// Explicit symbols; defaults to every active security.
    pub symbols: Option<Vec<String>>,
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotBatchSummary {
    pub period: NaiveDate,
    pub dry_run: bool,
    pub created: usize,
    pub skipped: usize,
    pub errored: usize,
    pub no_data: usize,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
}

impl SnapshotBatchSummary {
    fn new(period: NaiveDate, dry_run: bool) -> Self {
        Self {
            period,
            dry_run,
            created: 0,
            skipped: 0,
            errored: 0,
            no_data: 0,
            warnings: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn record(&mut self, symbol: &str, outcome: SnapshotOutcome) {
        match outcome {
            SnapshotOutcome::Created => self.created += 1,
            SnapshotOutcome::Skipped => self.skipped += 1,
            SnapshotOutcome::NoData => self.no_data += 1,
        }
        let prefix = if self.dry_run { "would be " } else { "" };
        self.messages.push(format!("{symbol}: {prefix}{outcome}"));
    }

    fn record_error(&mut self, symbol: &str, error: impl std::fmt::Display) {
        self.errored += 1;
        self.messages.push(format!("{symbol}: error: {error}"));
    }
}

#[derive(Clone)]
pub struct SnapshotArchiver {
    storage: Storage,
}

impl SnapshotArchiver {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Snapshot one security for `period`. With `dry_run` the outcome is
    /// reported but nothing is written.
    pub async fn create_snapshot(
        &self,
        security: &WatchedSecurity,
        period: NaiveDate,
        force: bool,
        dry_run: bool,
    ) -> Result<SnapshotOutcome> {
        let symbol = security.symbol.as_str();
        let existing = self.storage.find_snapshot(symbol, period).await?;

        if existing.is_some() && !force {
            debug!(symbol, %period, "Snapshot exists, skipping");
            return Ok(SnapshotOutcome::Skipped);
        }

        if !security.has_any_valuation() {
            debug!(symbol, %period, "No valuation to snapshot");
            return Ok(SnapshotOutcome::NoData);
        }

        if dry_run {
            return Ok(SnapshotOutcome::Created);
        }

        let snapshot = ValuationSnapshot::capture(security, period);
        if existing.is_some() {
            self.storage.replace_snapshot(&snapshot).await?;
            info!(symbol, %period, "Snapshot replaced");
            return Ok(SnapshotOutcome::Created);
        }

        self.insert_or_translate(&snapshot, force).await
    }

    /// Insert a snapshot believed to be new. A unique-constraint clash means
    /// another writer got there between the lookup and the insert.
    async fn insert_or_translate(
        &self,
        snapshot: &ValuationSnapshot,
        force: bool,
    ) -> Result<SnapshotOutcome> {
        let symbol = snapshot.symbol.as_str();
        let period = snapshot.period_date;
        match self.storage.insert_snapshot(snapshot).await? {
            InsertOutcome::Inserted => {
                info!(symbol, %period, "Snapshot created");
                Ok(SnapshotOutcome::Created)
            }
            InsertOutcome::Duplicate if force => {
                self.storage.replace_snapshot(snapshot).await?;
                info!(symbol, %period, "Snapshot replaced after concurrent insert");
                Ok(SnapshotOutcome::Created)
            }
            InsertOutcome::Duplicate => {
                debug!(symbol, %period, "Snapshot inserted concurrently, skipping");
                Ok(SnapshotOutcome::Skipped)
            }
        }
    }

    /// Snapshot a set of securities for one period. Per-security failures
    /// are counted and reported; they never abort the batch.
    pub async fn create_batch(
        &self,
        request: &SnapshotRequest,
        today: NaiveDate,
    ) -> Result<SnapshotBatchSummary> {
        let resolved = resolve_period(request.date, today);
        let mut summary = SnapshotBatchSummary::new(resolved.date, request.dry_run);
        if let Some(warning) = resolved.warning {
            warn!(period = %resolved.date, %warning, "Snapshot period override");
            summary.warnings.push(warning);
        }

        let securities = match &request.symbols {
            Some(symbols) => {
                let mut found = Vec::with_capacity(symbols.len());
                for symbol in symbols {
                    match self.storage.get_security(symbol).await {
                        Ok(Some(sec)) => found.push(sec),
                        Ok(None) => summary.record_error(&symbol.to_uppercase(), "not on the watch list"),
                        Err(e) => summary.record_error(&symbol.to_uppercase(), e),
                    }
                }
                found
            }
            None => self.storage.list_active_securities().await?,
        };

        info!(
            period = %summary.period,
            count = securities.len(),
            force = request.force,
            dry_run = request.dry_run,
            "Snapshot batch starting"
        );

        for security in &securities {
            match self
                .create_snapshot(security, summary.period, request.force, request.dry_run)
                .await
            {
                Ok(outcome) => summary.record(&security.symbol, outcome),
                Err(e) => {
                    warn!(symbol = %security.symbol, error = %e, "Snapshot failed");
                    summary.record_error(&security.symbol, e);
                }
            }
        }

        info!(
            period = %summary.period,
            created = summary.created,
            skipped = summary.skipped,
            errored = summary.errored,
            no_data = summary.no_data,
            "Snapshot batch complete"
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
