//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::{DcfAssumptions, Pipeline};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub scan: ScanConfig,
    pub valuation: ValuationConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
    pub watchlist: Vec<WatchlistEntry>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    /// Provider budget; spacing between calls is derived from it.
    pub calls_per_minute: u32,
    /// Explicit spacing override in seconds.
    pub min_call_spacing_secs: Option<u64>,
    pub request_timeout_secs: u64,
    pub max_contracts_per_symbol: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co/query".to_string(),
            api_key_env: "ALPHA_VANTAGE_API_KEY".to_string(),
            calls_per_minute: 5,
            min_call_spacing_secs: None,
            request_timeout_secs: 20,
            max_contracts_per_symbol: 25,
        }
    }
}

impl ProviderConfig {
    /// Minimum delay between two provider calls.
    pub fn call_spacing(&self) -> Duration {
        match self.min_call_spacing_secs {
            Some(secs) => Duration::from_secs(secs),
            None => {
                let per_minute = self.calls_per_minute.max(1) as f64;
                Duration::from_secs_f64(60.0 / per_minute)
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub fundamentals_ttl_days: i64,
    pub results_ttl_minutes: i64,
    pub scan_lock_ttl_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fundamentals_ttl_days: 7,
            results_ttl_minutes: 45,
            scan_lock_ttl_minutes: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { interval_secs: 1800 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValuationConfig {
    pub interval_secs: u64,
    /// How often the idempotent quarterly snapshot check runs.
    pub snapshot_check_interval_secs: u64,
    pub default_assumptions: DcfAssumptions,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 86_400,
            snapshot_check_interval_secs: 86_400,
            default_assumptions: DcfAssumptions::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://valuewatch.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8088,
        }
    }
}

/// A security seeded into storage on startup if it does not exist yet.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchlistEntry {
    pub symbol: String,
    #[serde(default)]
    pub preferred_pipeline: Option<Pipeline>,
    #[serde(default)]
    pub assumptions: Option<DcfAssumptions>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The provider API key, wrapped so it never ends up in logs.
    pub fn provider_api_key(&self) -> Result<SecretString> {
        Self::resolve_env(&self.provider.api_key_env).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.cache.fundamentals_ttl_days, 7);
        assert_eq!(cfg.cache.results_ttl_minutes, 45);
        assert_eq!(cfg.provider.calls_per_minute, 5);
        assert!(cfg.watchlist.is_empty());
    }

    #[test]
    fn test_call_spacing_from_budget() {
        let mut provider = ProviderConfig::default();
        assert_eq!(provider.call_spacing(), Duration::from_secs(12));

        provider.calls_per_minute = 4;
        assert_eq!(provider.call_spacing(), Duration::from_secs(15));

        provider.min_call_spacing_secs = Some(13);
        assert_eq!(provider.call_spacing(), Duration::from_secs(13));
    }

    #[test]
    fn test_parse_watchlist() {
        let cfg = AppConfig::parse(
            r#"
            [scan]
            interval_secs = 600

            [[watchlist]]
            symbol = "AAPL"
            preferred_pipeline = "fcf"

            [[watchlist]]
            symbol = "KO"
            [watchlist.assumptions]
            eps_growth_rate = 0.05
            eps_terminal_multiple = 18.0
            fcf_growth_rate = 0.04
            fcf_terminal_multiple = 16.0
            desired_return = 0.12
            projection_years = 7
            "#,
        )
        .unwrap();

        assert_eq!(cfg.scan.interval_secs, 600);
        assert_eq!(cfg.watchlist.len(), 2);
        assert_eq!(cfg.watchlist[0].preferred_pipeline, Some(Pipeline::Fcf));
        let ko = cfg.watchlist[1].assumptions.unwrap();
        assert_eq!(ko.projection_years, 7);
        assert!((ko.desired_return - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_shipped_config_parses() {
        let cfg = AppConfig::parse(include_str!("../config.toml")).unwrap();
        assert_eq!(cfg.watchlist.len(), 3);
        assert_eq!(cfg.valuation.default_assumptions, DcfAssumptions::default());
        assert_eq!(cfg.provider.call_spacing(), Duration::from_secs(12));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/valuewatch.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
