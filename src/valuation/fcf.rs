//! Free-cash-flow valuation.
//!
//! TTM FCF is the sum of (operating cash flow - capex) over the four most
//! recent quarters, divided by shares outstanding. The per-share figure is
//! reported even when it is negative and the DCF is skipped.

use super::dcf;
use crate::types::{
    CompanyOverview, DcfAssumptions, Pipeline, PipelineOutcome, PipelineResult,
    QuarterlyCashFlow, WatchError,
};

pub const REQUIRED_QUARTERS: usize = 4;

/// Value a security from its trailing-twelve-month free cash flow.
pub fn evaluate(
    quarters: &[QuarterlyCashFlow],
    overview: &CompanyOverview,
    assumptions: &DcfAssumptions,
) -> PipelineResult {
    let per_share = match fcf_per_share(quarters, overview) {
        Ok(per_share) => per_share,
        Err(e) => {
            return PipelineResult {
                pipeline: Pipeline::Fcf,
                metric: None,
                outcome: PipelineOutcome::from_error(&e),
            }
        }
    };

    let outcome = match intrinsic_value(per_share, assumptions) {
        Ok(value) => PipelineOutcome::Success { value },
        Err(e) => PipelineOutcome::from_error(&e),
    };

    PipelineResult {
        pipeline: Pipeline::Fcf,
        metric: Some(dcf::round_cents(per_share)),
        outcome,
    }
}

/// Sum of quarterly FCF over the four most recent quarters.
pub fn ttm_free_cash_flow(quarters: &[QuarterlyCashFlow]) -> Result<f64, WatchError> {
    if quarters.len() < REQUIRED_QUARTERS {
        return Err(WatchError::InsufficientHistory {
            available: quarters.len(),
            required: REQUIRED_QUARTERS,
        });
    }

    let mut recent: Vec<&QuarterlyCashFlow> = quarters.iter().collect();
    recent.sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));

    recent
        .into_iter()
        .take(REQUIRED_QUARTERS)
        .map(|q| match (q.operating_cash_flow, q.capital_expenditures) {
            (Some(ocf), Some(capex)) => Ok(ocf - capex),
            _ => Err(WatchError::InvalidFundamentals(format!(
                "cash flow incomplete for quarter ending {}",
                q.fiscal_date_ending
            ))),
        })
        .sum()
}

/// Unrounded TTM FCF per share.
pub fn fcf_per_share(
    quarters: &[QuarterlyCashFlow],
    overview: &CompanyOverview,
) -> Result<f64, WatchError> {
    let ttm = ttm_free_cash_flow(quarters)?;
    match overview.shares_outstanding {
        Some(shares) if shares.is_finite() && shares > 0.0 => Ok(ttm / shares),
        Some(shares) => Err(WatchError::InvalidFundamentals(format!(
            "shares outstanding is not positive ({shares})"
        ))),
        None => Err(WatchError::InvalidFundamentals(
            "shares outstanding missing".into(),
        )),
    }
}

fn intrinsic_value(per_share: f64, assumptions: &DcfAssumptions) -> Result<f64, WatchError> {
    if per_share <= 0.0 {
        return Err(WatchError::InvalidFundamentals(format!(
            "FCF per share is not positive ({:.2})",
            per_share
        )));
    }

    let (growth, multiple) = assumptions.for_pipeline(Pipeline::Fcf);
    dcf::validate_inputs(growth, multiple, assumptions.desired_return, assumptions.projection_years)?;

    super::checked_value(dcf::present_value(
        per_share,
        growth,
        multiple,
        assumptions.desired_return,
        assumptions.projection_years,
    ))
}
