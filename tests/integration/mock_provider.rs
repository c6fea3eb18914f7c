//! Mock market data provider for integration testing.
//!
//! Provides a deterministic `MarketDataProvider` that serves fundamentals
//! and put chains from in-memory tables and counts calls per endpoint,
//! with no network access. Also provides a cache backend that is always
//! down.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use valuewatch::cache::CacheBackend;
use valuewatch::market_data::MarketDataProvider;
use valuewatch::types::{CompanyOverview, PutOption, QuarterlyCashFlow, WatchError};

#[derive(Default)]
pub struct MockProvider {
    overviews: Mutex<HashMap<String, CompanyOverview>>,
    cash_flows: Mutex<HashMap<String, Vec<QuarterlyCashFlow>>>,
    puts: Mutex<HashMap<String, Vec<PutOption>>>,
    /// If set, every call fails with this error.
    outage: Mutex<Option<WatchError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_overview(&self, symbol: &str, trailing_eps: Option<f64>, shares: Option<f64>) {
        self.overviews.lock().unwrap().insert(
            symbol.to_string(),
            CompanyOverview {
                symbol: symbol.to_string(),
                trailing_eps,
                shares_outstanding: shares,
            },
        );
    }

    /// One record per free-cash-flow figure, most recent first, each built
    /// as operating cash flow `fcf + 1bn` less capex `1bn`.
    pub fn set_cash_flow(&self, symbol: &str, quarterly_fcf: &[f64]) {
        let latest = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
        let records = quarterly_fcf
            .iter()
            .enumerate()
            .map(|(i, fcf)| QuarterlyCashFlow {
                fiscal_date_ending: latest - Duration::days(91 * i as i64),
                operating_cash_flow: Some(fcf + 1e9),
                capital_expenditures: Some(1e9),
            })
            .collect();
        self.cash_flows.lock().unwrap().insert(symbol.to_string(), records);
    }

    pub fn set_puts(&self, symbol: &str, strikes: &[f64]) {
        let expiration = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        let puts = strikes
            .iter()
            .map(|&strike| PutOption {
                strike,
                premium: (strike * 0.02 * 100.0).round() / 100.0,
                expiration,
            })
            .collect();
        self.puts.lock().unwrap().insert(symbol.to_string(), puts);
    }

    pub fn set_outage(&self, error: Option<WatchError>) {
        *self.outage.lock().unwrap() = error;
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    fn record(&self, endpoint: &'static str) -> Result<(), WatchError> {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
        match &*self.outage.lock().unwrap() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn not_found(symbol: &str) -> WatchError {
        WatchError::UpstreamUnavailable(format!("no data for {symbol}"))
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch_company_overview(&self, symbol: &str) -> Result<CompanyOverview, WatchError> {
        self.record("overview")?;
        self.overviews
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| Self::not_found(symbol))
    }

    async fn fetch_quarterly_cash_flow(
        &self,
        symbol: &str,
    ) -> Result<Vec<QuarterlyCashFlow>, WatchError> {
        self.record("cash_flow")?;
        self.cash_flows
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| Self::not_found(symbol))
    }

    async fn fetch_put_options(&self, symbol: &str) -> Result<Vec<PutOption>, WatchError> {
        self.record("puts")?;
        self.puts
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| Self::not_found(symbol))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Cache backend that fails every call.
pub struct DownCache;

impl CacheBackend for DownCache {
    fn get(&self, _key: &str) -> Result<Option<Value>, WatchError> {
        Err(WatchError::CacheUnavailable("connection refused".into()))
    }
    fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), WatchError> {
        Err(WatchError::CacheUnavailable("connection refused".into()))
    }
    fn add(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<bool, WatchError> {
        Err(WatchError::CacheUnavailable("connection refused".into()))
    }
    fn compare_and_set(
        &self,
        _key: &str,
        _expected: &Value,
        _value: Value,
        _ttl: Duration,
    ) -> Result<bool, WatchError> {
        Err(WatchError::CacheUnavailable("connection refused".into()))
    }
    fn delete(&self, _key: &str) -> Result<(), WatchError> {
        Err(WatchError::CacheUnavailable("connection refused".into()))
    }
}
