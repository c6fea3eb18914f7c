//! Intrinsic value computation.
//!
//! Two pipelines (EPS and FCF) share the `dcf::present_value` primitive.
//! For each security they run independently: a skip or error in one never
//! clears the other's stored value. An upstream failure keeps the pipeline's
//! previous value; fresh inputs that rule out a value clear it.

pub mod dcf;
pub mod eps;
pub mod fcf;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::fundamentals::FundamentalsCache;
use crate::storage::{Storage, ValuationUpdate};
use crate::types::{
    Pipeline, PipelineOutcome, PipelineResult, WatchError, WatchedSecurity,
};

/// A computed value is a usable positive number, or the pipeline did not
/// produce one.
pub(crate) fn checked_value(value: f64) -> Result<f64, WatchError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(WatchError::InvalidFundamentals(format!(
            "present value is not a positive number ({value})"
        )))
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineCounts {
    pub success: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl PipelineCounts {
    fn record(&mut self, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Success { .. } => self.success += 1,
            PipelineOutcome::Skipped { .. } => self.skipped += 1,
            PipelineOutcome::Error { .. } => self.errored += 1,
        }
    }
}

/// Outcome of both pipelines for one security.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityValuation {
    pub symbol: String,
    pub eps: PipelineResult,
    pub fcf: PipelineResult,
}

impl SecurityValuation {
    pub fn result(&self, pipeline: Pipeline) -> &PipelineResult {
        match pipeline {
            Pipeline::Eps => &self.eps,
            Pipeline::Fcf => &self.fcf,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValuationRunSummary {
    pub requested: usize,
    pub eps: PipelineCounts,
    pub fcf: PipelineCounts,
    /// Securities that could not be valued at all (unknown, storage failure).
    pub errored: usize,
    pub items: Vec<SecurityValuation>,
    pub messages: Vec<String>,
}

impl ValuationRunSummary {
    pub fn counts(&self, pipeline: Pipeline) -> &PipelineCounts {
        match pipeline {
            Pipeline::Eps => &self.eps,
            Pipeline::Fcf => &self.fcf,
        }
    }

    pub fn item(&self, symbol: &str) -> Option<&SecurityValuation> {
        self.items.iter().find(|i| i.symbol.eq_ignore_ascii_case(symbol))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ValuationEngine {
    storage: Storage,
    fundamentals: Arc<FundamentalsCache>,
}

impl ValuationEngine {
    pub fn new(storage: Storage, fundamentals: Arc<FundamentalsCache>) -> Self {
        Self {
            storage,
            fundamentals,
        }
    }

    /// Value the given symbols, or every active security when `symbols` is
    /// `None`. Securities are processed one at a time so provider calls stay
    /// sequential.
    pub async fn compute(
        &self,
        symbols: Option<&[String]>,
        force_refresh: bool,
    ) -> Result<ValuationRunSummary> {
        let mut summary = ValuationRunSummary::default();

        let securities = match symbols {
            Some(symbols) => {
                let mut found = Vec::with_capacity(symbols.len());
                for symbol in symbols {
                    match self.storage.get_security(symbol).await {
                        Ok(Some(sec)) => found.push(sec),
                        Ok(None) => {
                            summary.requested += 1;
                            summary.errored += 1;
                            summary
                                .messages
                                .push(format!("{}: not on the watch list", symbol.to_uppercase()));
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "Failed to load security");
                            summary.requested += 1;
                            summary.errored += 1;
                            summary
                                .messages
                                .push(format!("{}: failed to load: {e}", symbol.to_uppercase()));
                        }
                    }
                }
                found
            }
            None => self.storage.list_active_securities().await?,
        };

        info!(count = securities.len(), force_refresh, "Valuation run starting");

        for security in securities {
            summary.requested += 1;
            let item = self.value_security(&security, force_refresh).await;
            summary.eps.record(&item.eps.outcome);
            summary.fcf.record(&item.fcf.outcome);

            for result in [&item.eps, &item.fcf] {
                summary
                    .messages
                    .push(format!("{} {}: {}", item.symbol, result.pipeline, result.outcome));
            }

            if let Err(e) = self.persist(&item).await {
                warn!(symbol = %item.symbol, error = %e, "Failed to store valuation");
                summary.errored += 1;
                summary
                    .messages
                    .push(format!("{}: failed to store valuation: {e}", item.symbol));
            }
            summary.items.push(item);
        }

        info!(
            requested = summary.requested,
            eps_success = summary.eps.success,
            fcf_success = summary.fcf.success,
            errored = summary.errored,
            "Valuation run complete"
        );
        Ok(summary)
    }

    /// Run both pipelines for one security without touching storage.
    pub async fn value_security(
        &self,
        security: &WatchedSecurity,
        force_refresh: bool,
    ) -> SecurityValuation {
        let symbol = security.symbol.as_str();
        let assumptions = &security.assumptions;

        // Both pipelines need the overview; fetch it once.
        let overview = self.fundamentals.overview(symbol, force_refresh).await;
        if let Err(e) = &overview {
            warn!(symbol, error = %e, "Company overview unavailable");
        }

        let eps = match &overview {
            Ok(overview) => eps::evaluate(overview, assumptions),
            Err(e) => failed(Pipeline::Eps, e),
        };

        let fcf = match &overview {
            Ok(overview) => match self.fundamentals.quarterly_cash_flow(symbol, force_refresh).await {
                Ok(quarters) => fcf::evaluate(&quarters, overview, assumptions),
                Err(e) => {
                    warn!(symbol, error = %e, "Quarterly cash flow unavailable");
                    failed(Pipeline::Fcf, &e)
                }
            },
            Err(e) => failed(Pipeline::Fcf, e),
        };

        SecurityValuation {
            symbol: security.symbol.clone(),
            eps,
            fcf,
        }
    }

    async fn persist(&self, item: &SecurityValuation) -> Result<()> {
        let any_success = item.eps.outcome.is_success() || item.fcf.outcome.is_success();
        let update = ValuationUpdate {
            trailing_eps: item.eps.metric,
            fcf_per_share: item.fcf.metric,
            eps_intrinsic_value: item.eps.outcome.value(),
            fcf_intrinsic_value: item.fcf.outcome.value(),
            clear_eps_intrinsic_value: item.eps.invalidates_value(),
            clear_fcf_intrinsic_value: item.fcf.invalidates_value(),
            valued_at: any_success.then(Utc::now),
        };
        self.storage.record_valuation(&item.symbol, &update).await?;
        Ok(())
    }
}

fn failed(pipeline: Pipeline, error: &WatchError) -> PipelineResult {
    PipelineResult {
        pipeline,
        metric: None,
        outcome: PipelineOutcome::from_error(error),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
