//! Application facade.
//!
//! Wires storage, caches, the rate-limited provider and the engines
//! together and exposes the operations the binary and the HTTP API call.
//! One provider instance (and therefore one rate limiter) is shared by
//! the scanner and the fundamentals cache.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

use crate::archive::comparison::{Comparison, ComparisonEngine};
use crate::archive::snapshot::{SnapshotArchiver, SnapshotBatchSummary, SnapshotRequest};
use crate::cache::fundamentals::FundamentalsCache;
use crate::cache::results::{ResultsCache, ScanView};
use crate::cache::{CacheBackend, MemoryCache};
use crate::config::{AppConfig, WatchlistEntry};
use crate::engine::lock::ScanLock;
use crate::engine::scanner::ScanOrchestrator;
use crate::market_data::alpha_vantage::AlphaVantageClient;
use crate::market_data::rate_limiter::RateLimitedProvider;
use crate::market_data::MarketDataProvider;
use crate::storage::Storage;
use crate::types::{DcfAssumptions, ScanAck, WatchedSecurity};
use crate::valuation::{ValuationEngine, ValuationRunSummary};

pub struct App {
    storage: Storage,
    cache: Arc<dyn CacheBackend>,
    results: ResultsCache,
    scanner: Arc<ScanOrchestrator>,
    valuation: ValuationEngine,
    archiver: SnapshotArchiver,
    comparison: ComparisonEngine,
}

impl App {
    /// Build the production stack from configuration: SQLite storage, an
    /// in-process cache and the rate-limited Alpha Vantage client.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let api_key = cfg
            .provider_api_key()
            .context("Market data API key is required")?;
        let client = AlphaVantageClient::new(
            &cfg.provider.base_url,
            api_key,
            cfg.provider.request_timeout_secs,
        )?;
        let spacing = cfg.provider.call_spacing();
        info!(
            provider = client.name(),
            spacing_secs = spacing.as_secs_f64(),
            "Market data provider ready"
        );
        let provider: Arc<dyn MarketDataProvider> = Arc::new(RateLimitedProvider::new(client, spacing));

        let storage = Storage::connect(&cfg.storage.database_url).await?;
        Ok(Self::new(storage, provider, Arc::new(MemoryCache::new()), cfg))
    }

    /// Assemble the stack from already-built parts.
    pub fn new(
        storage: Storage,
        provider: Arc<dyn MarketDataProvider>,
        backend: Arc<dyn CacheBackend>,
        cfg: &AppConfig,
    ) -> Self {
        let results = ResultsCache::with_ttl(
            backend.clone(),
            Duration::minutes(cfg.cache.results_ttl_minutes),
        );
        let lock = ScanLock::new(
            backend.clone(),
            Duration::minutes(cfg.cache.scan_lock_ttl_minutes),
        );
        let fundamentals = Arc::new(FundamentalsCache::with_ttl(
            backend.clone(),
            provider.clone(),
            Duration::days(cfg.cache.fundamentals_ttl_days),
        ));

        let scanner = Arc::new(ScanOrchestrator::new(
            storage.clone(),
            provider,
            results.clone(),
            lock,
            cfg.provider.max_contracts_per_symbol,
        ));

        Self {
            valuation: ValuationEngine::new(storage.clone(), fundamentals),
            archiver: SnapshotArchiver::new(storage.clone()),
            comparison: ComparisonEngine::new(storage.clone()),
            storage,
            cache: backend,
            results,
            scanner,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Drop expired cache entries (fundamentals, scan output, stale locks).
    pub fn evict_expired_cache(&self) -> usize {
        self.cache.evict_expired()
    }

    // -- Watch list --------------------------------------------------------

    /// Insert configured securities that are not stored yet. Existing rows
    /// (and any operator edits to them) are left alone.
    pub async fn seed_watchlist(
        &self,
        entries: &[WatchlistEntry],
        defaults: &DcfAssumptions,
    ) -> Result<usize> {
        let mut inserted = 0;
        for entry in entries {
            let mut security =
                WatchedSecurity::new(&entry.symbol, entry.assumptions.unwrap_or(*defaults));
            if let Some(pipeline) = entry.preferred_pipeline {
                security.preferred_pipeline = pipeline;
            }
            if self.storage.insert_security_if_absent(&security).await? {
                info!(symbol = %security.symbol, "Seeded watch list entry");
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    // -- Scan ------------------------------------------------------------

    /// Start a scan in the background; poll `scan_view` for the outcome.
    pub fn trigger_scan(&self) -> ScanAck {
        self.scanner.trigger_scan()
    }

    /// Run a scan to completion (one-shot mode).
    pub async fn run_scan(&self) -> ScanAck {
        self.scanner.run_scan().await
    }

    pub fn scan_view(&self) -> ScanView {
        self.results.view()
    }

    // -- Valuation -------------------------------------------------------

    pub async fn compute_valuations(
        &self,
        symbols: Option<&[String]>,
        force_refresh: bool,
    ) -> Result<ValuationRunSummary> {
        self.valuation.compute(symbols, force_refresh).await
    }

    // -- Snapshots -------------------------------------------------------

    pub async fn create_quarterly_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<SnapshotBatchSummary> {
        self.create_quarterly_snapshot_on(request, Utc::now().date_naive())
            .await
    }

    /// As `create_quarterly_snapshot`, with an explicit "today".
    pub async fn create_quarterly_snapshot_on(
        &self,
        request: &SnapshotRequest,
        today: NaiveDate,
    ) -> Result<SnapshotBatchSummary> {
        self.archiver.create_batch(request, today).await
    }

    // -- Comparison ------------------------------------------------------

    pub async fn compare(&self, symbol: &str) -> Result<Option<Comparison>> {
        self.compare_on(symbol, Utc::now().date_naive()).await
    }

    pub async fn compare_on(&self, symbol: &str, today: NaiveDate) -> Result<Option<Comparison>> {
        self.comparison.compare(symbol, today).await
    }
}
