//! Alpha Vantage market data integration.
//!
//! API docs: https://www.alphavantage.co/documentation/
//! Base URL: https://www.alphavantage.co/query
//! Rate limit: 5 requests/minute on the free tier (throttling is signalled
//! with a 200 response carrying a `Note` or `Information` field).
//! Auth: `apikey` query param.
//!
//! Functions used: `OVERVIEW`, `CASH_FLOW`, `HISTORICAL_OPTIONS`.
//! All numeric fields arrive as strings, with "None" or "-" for missing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::MarketDataProvider;
use crate::types::{CompanyOverview, PutOption, QuarterlyCashFlow, WatchError};

const PROVIDER_NAME: &str = "alphavantage";

// ---------------------------------------------------------------------------
// API response types (Alpha Vantage JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AvOverview {
    #[serde(rename = "Symbol", default)]
    symbol: Option<String>,
    #[serde(rename = "EPS", default)]
    eps: Option<String>,
    #[serde(rename = "SharesOutstanding", default)]
    shares_outstanding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvCashFlow {
    #[serde(default)]
    quarterly_reports: Vec<AvCashFlowReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvCashFlowReport {
    fiscal_date_ending: String,
    #[serde(default)]
    operating_cashflow: Option<String>,
    #[serde(default)]
    capital_expenditures: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvOptionChain {
    #[serde(default)]
    data: Vec<AvOptionContract>,
}

#[derive(Debug, Deserialize)]
struct AvOptionContract {
    expiration: String,
    strike: String,
    #[serde(rename = "type")]
    contract_type: String,
    #[serde(default)]
    mark: Option<String>,
    #[serde(default)]
    last: Option<String>,
    #[serde(default)]
    bid: Option<String>,
    #[serde(default)]
    ask: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse an Alpha Vantage string-encoded number.
fn parse_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw == "-" {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reject throttle and error bodies that arrive with HTTP 200.
fn check_body(body: &Value) -> Result<(), WatchError> {
    for key in ["Note", "Information"] {
        if let Some(note) = body.get(key).and_then(Value::as_str) {
            return Err(WatchError::UpstreamRateLimited(note.to_string()));
        }
    }
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(WatchError::UpstreamUnavailable(msg.to_string()));
    }
    Ok(())
}

fn parse_overview(symbol: &str, body: Value) -> Result<CompanyOverview, WatchError> {
    let raw: AvOverview = serde_json::from_value(body)
        .map_err(|e| WatchError::UpstreamUnavailable(format!("malformed overview: {e}")))?;

    Ok(CompanyOverview {
        symbol: raw.symbol.unwrap_or_else(|| symbol.to_string()),
        trailing_eps: parse_number(raw.eps.as_deref()),
        shares_outstanding: parse_number(raw.shares_outstanding.as_deref()),
    })
}

fn parse_cash_flow(body: Value) -> Result<Vec<QuarterlyCashFlow>, WatchError> {
    let raw: AvCashFlow = serde_json::from_value(body)
        .map_err(|e| WatchError::UpstreamUnavailable(format!("malformed cash flow: {e}")))?;

    let mut quarters: Vec<QuarterlyCashFlow> = raw
        .quarterly_reports
        .into_iter()
        .filter_map(|r| {
            let date = NaiveDate::parse_from_str(&r.fiscal_date_ending, "%Y-%m-%d").ok()?;
            Some(QuarterlyCashFlow {
                fiscal_date_ending: date,
                operating_cash_flow: parse_number(r.operating_cashflow.as_deref()),
                capital_expenditures: parse_number(r.capital_expenditures.as_deref()),
            })
        })
        .collect();

    quarters.sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
    Ok(quarters)
}

fn parse_puts(body: Value) -> Result<Vec<PutOption>, WatchError> {
    let raw: AvOptionChain = serde_json::from_value(body)
        .map_err(|e| WatchError::UpstreamUnavailable(format!("malformed option chain: {e}")))?;

    let puts = raw
        .data
        .into_iter()
        .filter(|c| c.contract_type.eq_ignore_ascii_case("put"))
        .filter_map(|c| {
            let strike = parse_number(Some(&c.strike))?;
            let expiration = NaiveDate::parse_from_str(&c.expiration, "%Y-%m-%d").ok()?;
            let mid = match (parse_number(c.bid.as_deref()), parse_number(c.ask.as_deref())) {
                (Some(bid), Some(ask)) if ask > 0.0 => Some((bid + ask) / 2.0),
                _ => None,
            };
            let premium = parse_number(c.mark.as_deref())
                .filter(|p| *p > 0.0)
                .or(mid)
                .or_else(|| parse_number(c.last.as_deref()))?;
            Some(PutOption { strike, premium, expiration })
        })
        .collect();

    Ok(puts)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AlphaVantageClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl AlphaVantageClient {
    pub fn new(base_url: &str, api_key: SecretString, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("VALUEWATCH/0.1.0")
            .build()
            .context("Failed to build Alpha Vantage HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value, WatchError> {
        // The URL carries the API key; never log it.
        let url = format!(
            "{}?function={function}&symbol={}&apikey={}",
            self.base_url,
            urlencoding::encode(symbol),
            self.api_key.expose_secret()
        );

        let resp = self.http.get(&url).send().await.map_err(|e| {
            WatchError::UpstreamUnavailable(format!("{function} request failed for {symbol}: {}", e.without_url()))
        })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WatchError::UpstreamRateLimited(format!("{function} {symbol}: HTTP 429")));
        }
        if !status.is_success() {
            return Err(WatchError::UpstreamUnavailable(format!("{function} {symbol}: HTTP {status}")));
        }

        let body: Value = resp.json().await.map_err(|e| {
            WatchError::UpstreamUnavailable(format!("{function} {symbol}: unreadable body: {}", e.without_url()))
        })?;

        if let Err(e) = check_body(&body) {
            warn!(function, symbol, error = %e, "Alpha Vantage rejected request");
            return Err(e);
        }

        debug!(function, symbol, "Alpha Vantage response received");
        Ok(body)
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageClient {
    async fn fetch_company_overview(&self, symbol: &str) -> Result<CompanyOverview, WatchError> {
        let body = self.query("OVERVIEW", symbol).await?;
        parse_overview(symbol, body)
    }

    async fn fetch_quarterly_cash_flow(
        &self,
        symbol: &str,
    ) -> Result<Vec<QuarterlyCashFlow>, WatchError> {
        let body = self.query("CASH_FLOW", symbol).await?;
        parse_cash_flow(body)
    }

    async fn fetch_put_options(&self, symbol: &str) -> Result<Vec<PutOption>, WatchError> {
        let body = self.query("HISTORICAL_OPTIONS", symbol).await?;
        parse_puts(body)
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
