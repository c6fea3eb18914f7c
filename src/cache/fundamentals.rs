//! Long-lived cache for company fundamentals.
//!
//! Fundamentals change at most quarterly, so payloads are cached for a
//! week per (symbol, endpoint). A miss triggers a provider call (the
//! provider is expected to be rate limited). Upstream failures are never
//! cached, and a cache outage degrades to fetching straight from the
//! provider.

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::CacheBackend;
use crate::market_data::MarketDataProvider;
use crate::types::{CompanyOverview, QuarterlyCashFlow, WatchError};

pub const DEFAULT_FUNDAMENTALS_TTL_DAYS: i64 = 7;

/// Fundamentals endpoint a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundamentalsEndpoint {
    Overview,
    CashFlow,
}

impl FundamentalsEndpoint {
    pub const ALL: &'static [FundamentalsEndpoint] =
        &[FundamentalsEndpoint::Overview, FundamentalsEndpoint::CashFlow];

    pub fn as_str(&self) -> &'static str {
        match self {
            FundamentalsEndpoint::Overview => "overview",
            FundamentalsEndpoint::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for FundamentalsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct FundamentalsCache {
    backend: Arc<dyn CacheBackend>,
    provider: Arc<dyn MarketDataProvider>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FundamentalsCache {
    pub fn new(backend: Arc<dyn CacheBackend>, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::with_ttl(backend, provider, Duration::days(DEFAULT_FUNDAMENTALS_TTL_DAYS))
    }

    /// TTL is clamped to the seven-day maximum.
    pub fn with_ttl(
        backend: Arc<dyn CacheBackend>,
        provider: Arc<dyn MarketDataProvider>,
        ttl: Duration,
    ) -> Self {
        Self {
            backend,
            provider,
            ttl: ttl.min(Duration::days(DEFAULT_FUNDAMENTALS_TTL_DAYS)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(symbol: &str, endpoint: FundamentalsEndpoint) -> String {
        format!("fundamentals:{}:{}", symbol.to_uppercase(), endpoint)
    }

    pub async fn overview(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<CompanyOverview, WatchError> {
        self.get(symbol, FundamentalsEndpoint::Overview, force_refresh, || {
            self.provider.fetch_company_overview(symbol)
        })
        .await
    }

    /// Quarterly cash flow records, most recent first.
    pub async fn quarterly_cash_flow(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<Vec<QuarterlyCashFlow>, WatchError> {
        self.get(symbol, FundamentalsEndpoint::CashFlow, force_refresh, || {
            self.provider.fetch_quarterly_cash_flow(symbol)
        })
        .await
    }

    /// Cached read-through for one endpoint.
    ///
    /// Cached payloads are shape-checked on every read; a payload that no
    /// longer deserialises is treated as a miss.
    pub async fn get<T, F, Fut>(
        &self,
        symbol: &str,
        endpoint: FundamentalsEndpoint,
        force_refresh: bool,
        fetch: F,
    ) -> Result<T, WatchError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WatchError>>,
    {
        let key = Self::key(symbol, endpoint);

        if !force_refresh {
            match self.backend.get(&key) {
                Ok(Some(payload)) => match serde_json::from_value::<T>(payload) {
                    Ok(value) => {
                        debug!(symbol, %endpoint, "Fundamentals cache hit");
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(symbol, %endpoint, error = %e, "Cached fundamentals malformed, refetching");
                    }
                },
                Ok(None) => debug!(symbol, %endpoint, "Fundamentals cache miss"),
                Err(e) => warn!(symbol, %endpoint, error = %e, "Fundamentals cache unreadable, fetching directly"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = fetch().await?;

        match serde_json::to_value(&value) {
            Ok(payload) => {
                if let Err(e) = self.backend.set(&key, payload, self.ttl) {
                    warn!(symbol, %endpoint, error = %e, "Failed to cache fundamentals");
                }
            }
            Err(e) => warn!(symbol, %endpoint, error = %e, "Failed to serialise fundamentals"),
        }

        Ok(value)
    }

    /// Drop cached payloads for a symbol (one endpoint or all).
    pub fn invalidate(&self, symbol: &str, endpoint: Option<FundamentalsEndpoint>) {
        let endpoints = match endpoint {
            Some(ep) => vec![ep],
            None => FundamentalsEndpoint::ALL.to_vec(),
        };
        for ep in endpoints {
            if let Err(e) = self.backend.delete(&Self::key(symbol, ep)) {
                warn!(symbol, endpoint = %ep, error = %e, "Failed to invalidate fundamentals");
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Reads that went to the provider.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
