//! Shared types for the VALUEWATCH service.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that the cache, valuation, archive and
//! engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Watched security
// ---------------------------------------------------------------------------

/// Which DCF pipeline an operator prefers for option qualification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Eps,
    Fcf,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Eps => "eps",
            Pipeline::Fcf => "fcf",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Pipeline::Eps => Pipeline::Fcf,
            Pipeline::Fcf => Pipeline::Eps,
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Eps => write!(f, "EPS"),
            Pipeline::Fcf => write!(f, "FCF"),
        }
    }
}

impl std::str::FromStr for Pipeline {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eps" | "earnings" => Ok(Pipeline::Eps),
            "fcf" | "cashflow" | "free_cash_flow" => Ok(Pipeline::Fcf),
            other => anyhow::bail!("Unknown pipeline: {other}"),
        }
    }
}

/// DCF assumptions an operator sets per security.
///
/// Growth rates and the discount rate are fractions (0.10 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfAssumptions {
    pub eps_growth_rate: f64,
    pub eps_terminal_multiple: f64,
    pub fcf_growth_rate: f64,
    pub fcf_terminal_multiple: f64,
    /// Shared by both pipelines.
    pub desired_return: f64,
    pub projection_years: u32,
}

impl Default for DcfAssumptions {
    fn default() -> Self {
        Self {
            eps_growth_rate: 0.10,
            eps_terminal_multiple: 20.0,
            fcf_growth_rate: 0.10,
            fcf_terminal_multiple: 20.0,
            desired_return: 0.15,
            projection_years: 5,
        }
    }
}

impl DcfAssumptions {
    /// (growth, multiple) for the given pipeline.
    pub fn for_pipeline(&self, pipeline: Pipeline) -> (f64, f64) {
        match pipeline {
            Pipeline::Eps => (self.eps_growth_rate, self.eps_terminal_multiple),
            Pipeline::Fcf => (self.fcf_growth_rate, self.fcf_terminal_multiple),
        }
    }
}

/// A stock tracked for scanning and valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedSecurity {
    pub symbol: String,
    pub active: bool,
    pub assumptions: DcfAssumptions,
    pub preferred_pipeline: Pipeline,
    /// Trailing EPS used by the last EPS computation.
    pub trailing_eps: Option<f64>,
    /// FCF per share from the last FCF computation (may be negative).
    pub fcf_per_share: Option<f64>,
    pub eps_intrinsic_value: Option<f64>,
    pub fcf_intrinsic_value: Option<f64>,
    pub valued_at: Option<DateTime<Utc>>,
}

impl WatchedSecurity {
    pub fn new(symbol: &str, assumptions: DcfAssumptions) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            active: true,
            assumptions,
            preferred_pipeline: Pipeline::Eps,
            trailing_eps: None,
            fcf_per_share: None,
            eps_intrinsic_value: None,
            fcf_intrinsic_value: None,
            valued_at: None,
        }
    }

    pub fn intrinsic_value(&self, pipeline: Pipeline) -> Option<f64> {
        match pipeline {
            Pipeline::Eps => self.eps_intrinsic_value,
            Pipeline::Fcf => self.fcf_intrinsic_value,
        }
    }

    /// Preferred pipeline's value, falling back to the other pipeline.
    pub fn effective_intrinsic_value(&self) -> Option<f64> {
        self.intrinsic_value(self.preferred_pipeline)
            .or_else(|| self.intrinsic_value(self.preferred_pipeline.other()))
    }

    pub fn has_any_valuation(&self) -> bool {
        self.eps_intrinsic_value.is_some() || self.fcf_intrinsic_value.is_some()
    }
}

// ---------------------------------------------------------------------------
// Scan state and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Idle => write!(f, "Idle"),
            ScanStatus::Running => write!(f, "Running"),
            ScanStatus::Completed => write!(f, "Completed"),
            ScanStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// The single logical scan run record, overwritten on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRunState {
    pub status: ScanStatus,
    pub message: String,
    pub run_id: Option<uuid::Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScanRunState {
    pub const NEVER: &'static str = "Never";
    pub const UNAVAILABLE: &'static str = "Status unavailable";

    /// No scan has ever written a status.
    pub fn never() -> Self {
        Self {
            status: ScanStatus::Idle,
            message: Self::NEVER.to_string(),
            run_id: None,
            updated_at: None,
        }
    }

    /// The status could not be read (cache outage or malformed payload).
    pub fn unavailable() -> Self {
        Self {
            status: ScanStatus::Idle,
            message: Self::UNAVAILABLE.to_string(),
            run_id: None,
            updated_at: None,
        }
    }

    pub fn now(status: ScanStatus, message: impl Into<String>, run_id: Option<uuid::Uuid>) -> Self {
        Self {
            status,
            message: message.into(),
            run_id,
            updated_at: Some(Utc::now()),
        }
    }
}

/// A put contract as returned by the market data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutOption {
    pub strike: f64,
    pub premium: f64,
    pub expiration: NaiveDate,
}

/// Ephemeral per-scan contract output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContractResult {
    pub symbol: String,
    pub strike: f64,
    pub premium: f64,
    pub expiration: NaiveDate,
}

/// Everything one scan pass records for a single security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScanResult {
    pub symbol: String,
    pub intrinsic_value: Option<f64>,
    pub contracts: Vec<OptionContractResult>,
    pub qualifying_contracts: usize,
    /// Advisory: at least one strike at or below the intrinsic value.
    pub passes: bool,
}

/// Results of the latest scan, keyed by symbol.
pub type ScanResults = BTreeMap<String, SecurityScanResult>;

/// Acknowledgement returned by a scan trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanAck {
    Accepted { run_id: uuid::Uuid },
    AlreadyRunning,
}

// ---------------------------------------------------------------------------
// Fundamentals
// ---------------------------------------------------------------------------

/// Company overview fields the valuation pipelines need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyOverview {
    pub symbol: String,
    pub trailing_eps: Option<f64>,
    pub shares_outstanding: Option<f64>,
}

/// One quarter of cash flow data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyCashFlow {
    pub fiscal_date_ending: NaiveDate,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditures: Option<f64>,
}

// ---------------------------------------------------------------------------
// Valuation outcomes
// ---------------------------------------------------------------------------

/// Tagged outcome of one pipeline for one security.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success { value: f64 },
    Skipped { reason: String },
    Error { reason: String },
}

impl PipelineOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            PipelineOutcome::Success { value } => Some(*value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PipelineOutcome::Skipped { .. })
    }

    /// Classify a pipeline failure per the error taxonomy.
    pub fn from_error(err: &WatchError) -> Self {
        if err.is_skip() {
            PipelineOutcome::Skipped { reason: err.to_string() }
        } else {
            PipelineOutcome::Error { reason: err.to_string() }
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Success { value } => write!(f, "success ({value:.2})"),
            PipelineOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            PipelineOutcome::Error { reason } => write!(f, "error: {reason}"),
        }
    }
}

/// A pipeline's outcome plus the per-share input it derived, if any.
///
/// The input metric (trailing EPS, FCF per share) is recorded even when the
/// intrinsic value computation is skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub pipeline: Pipeline,
    pub metric: Option<f64>,
    pub outcome: PipelineOutcome,
}

impl PipelineResult {
    /// Fresh inputs were read but yield no usable value, so any stored
    /// value for this pipeline is stale. Upstream failures carry no metric
    /// and never invalidate.
    pub fn invalidates_value(&self) -> bool {
        self.metric.is_some() && !self.outcome.is_success()
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Immutable historical record of a security's valuation for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub symbol: String,
    pub period_date: NaiveDate,
    pub eps_intrinsic_value: Option<f64>,
    pub fcf_intrinsic_value: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub fcf_per_share: Option<f64>,
    pub assumptions: DcfAssumptions,
    pub preferred_pipeline: Pipeline,
    pub created_at: DateTime<Utc>,
}

impl ValuationSnapshot {
    /// Copy the security's current values and assumptions.
    pub fn capture(security: &WatchedSecurity, period_date: NaiveDate) -> Self {
        Self {
            symbol: security.symbol.clone(),
            period_date,
            eps_intrinsic_value: security.eps_intrinsic_value,
            fcf_intrinsic_value: security.fcf_intrinsic_value,
            trailing_eps: security.trailing_eps,
            fcf_per_share: security.fcf_per_share,
            assumptions: security.assumptions,
            preferred_pipeline: security.preferred_pipeline,
            created_at: Utc::now(),
        }
    }

    pub fn intrinsic_value(&self, pipeline: Pipeline) -> Option<f64> {
        match pipeline {
            Pipeline::Eps => self.eps_intrinsic_value,
            Pipeline::Fcf => self.fcf_intrinsic_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Created,
    Skipped,
    NoData,
}

impl fmt::Display for SnapshotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotOutcome::Created => write!(f, "created"),
            SnapshotOutcome::Skipped => write!(f, "skipped"),
            SnapshotOutcome::NoData => write!(f, "no data"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for VALUEWATCH.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WatchError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    #[error("Invalid fundamentals: {0}")]
    InvalidFundamentals(String),

    #[error("Invalid assumptions: {0}")]
    InvalidAssumptions(String),

    #[error("Insufficient history: {available} of {required} quarters available")]
    InsufficientHistory { available: usize, required: usize },

    #[error("Snapshot already exists for {symbol} at {period}")]
    DuplicateSnapshot { symbol: String, period: NaiveDate },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WatchError {
    /// Data-quality failures that mark an item skipped rather than errored.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            WatchError::InvalidFundamentals(_)
                | WatchError::InvalidAssumptions(_)
                | WatchError::InsufficientHistory { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
