//! Earnings-based valuation: trailing EPS projected through the DCF.

use super::dcf;
use crate::types::{
    CompanyOverview, DcfAssumptions, Pipeline, PipelineOutcome, PipelineResult, WatchError,
};

/// Value a security from its trailing EPS.
pub fn evaluate(overview: &CompanyOverview, assumptions: &DcfAssumptions) -> PipelineResult {
    let metric = overview.trailing_eps;
    let outcome = match intrinsic_value(overview, assumptions) {
        Ok(value) => PipelineOutcome::Success { value },
        Err(e) => PipelineOutcome::from_error(&e),
    };
    PipelineResult {
        pipeline: Pipeline::Eps,
        metric,
        outcome,
    }
}

fn intrinsic_value(
    overview: &CompanyOverview,
    assumptions: &DcfAssumptions,
) -> Result<f64, WatchError> {
    let eps = match overview.trailing_eps {
        Some(eps) if eps.is_finite() && eps > 0.0 => eps,
        Some(eps) => {
            return Err(WatchError::InvalidFundamentals(format!(
                "trailing EPS is not positive ({eps})"
            )))
        }
        None => {
            return Err(WatchError::InvalidFundamentals(
                "trailing EPS missing".into(),
            ))
        }
    };

    let (growth, multiple) = assumptions.for_pipeline(Pipeline::Eps);
    dcf::validate_inputs(growth, multiple, assumptions.desired_return, assumptions.projection_years)?;

    super::checked_value(dcf::present_value(
        eps,
        growth,
        multiple,
        assumptions.desired_return,
        assumptions.projection_years,
    ))
}
