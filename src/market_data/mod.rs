//! Market data provider integrations.
//!
//! Defines the `MarketDataProvider` trait and provides:
//! - Alpha Vantage: company overview, quarterly cash flow, put chains
//! - A rate-limited decorator that serialises and spaces provider calls

pub mod alpha_vantage;
pub mod rate_limiter;

use async_trait::async_trait;

use crate::types::{CompanyOverview, PutOption, QuarterlyCashFlow, WatchError};

/// Abstraction over the external market data provider.
///
/// Fundamentals calls are cached by the caller; option chains are always
/// fetched live.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Trailing EPS, shares outstanding and related overview fields.
    async fn fetch_company_overview(&self, symbol: &str) -> Result<CompanyOverview, WatchError>;

    /// Most recent quarters first.
    async fn fetch_quarterly_cash_flow(
        &self,
        symbol: &str,
    ) -> Result<Vec<QuarterlyCashFlow>, WatchError>;

    /// Current put contracts for a symbol.
    async fn fetch_put_options(&self, symbol: &str) -> Result<Vec<PutOption>, WatchError>;

    /// Provider name for logging and identification.
    fn name(&self) -> &'static str;
}
