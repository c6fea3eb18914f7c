//! Live valuation vs. historical snapshots.
//!
//! For each pipeline the current stored value is compared with:
//! - the latest snapshot dated strictly before today
//! - the latest snapshot dated on or before the same day twelve months ago

use anyhow::Result;
use chrono::{Months, NaiveDate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::storage::Storage;
use crate::types::{Pipeline, ValuationSnapshot, WatchedSecurity};

/// Change from a base snapshot value to the current value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    pub base_period: Option<NaiveDate>,
    pub base_value: Option<f64>,
    pub absolute: Option<f64>,
    pub percent: Option<f64>,
}

impl Delta {
    fn against(current: Option<f64>, base: Option<&ValuationSnapshot>, pipeline: Pipeline) -> Self {
        let base_value = base.and_then(|s| s.intrinsic_value(pipeline));
        let (absolute, percent) = change(current, base_value);
        Self {
            base_period: base.map(|s| s.period_date),
            base_value,
            absolute,
            percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineComparison {
    pub pipeline: Pipeline,
    pub current: Option<f64>,
    pub vs_prior: Delta,
    pub vs_year_ago: Delta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub preferred_pipeline: Pipeline,
    pub eps: PipelineComparison,
    pub fcf: PipelineComparison,
}

impl Comparison {
    pub fn pipeline(&self, pipeline: Pipeline) -> &PipelineComparison {
        match pipeline {
            Pipeline::Eps => &self.eps,
            Pipeline::Fcf => &self.fcf,
        }
    }
}

/// (absolute, percent) change from `base` to `current`, both rounded to
/// cents. Null if either side is null; percent is null for a zero base.
///
/// Computed in decimal so that e.g. 150.00 vs 140.00 is exactly +10.00.
pub fn change(current: Option<f64>, base: Option<f64>) -> (Option<f64>, Option<f64>) {
    let (Some(current), Some(base)) = (
        current.and_then(Decimal::from_f64),
        base.and_then(Decimal::from_f64),
    ) else {
        return (None, None);
    };

    let absolute = current - base;
    let percent = if base.is_zero() {
        None
    } else {
        absolute
            .checked_div(base.abs())
            .and_then(|ratio| ratio.checked_mul(dec!(100)))
            .and_then(cents)
    };
    (cents(absolute), percent)
}

fn cents(value: Decimal) -> Option<f64> {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
}

/// Latest snapshot strictly before `today`. `snapshots` is period-descending.
pub fn prior_snapshot(snapshots: &[ValuationSnapshot], today: NaiveDate) -> Option<&ValuationSnapshot> {
    snapshots.iter().find(|s| s.period_date < today)
}

/// Latest snapshot on or before twelve months before `today`.
pub fn year_ago_snapshot(snapshots: &[ValuationSnapshot], today: NaiveDate) -> Option<&ValuationSnapshot> {
    let target = today.checked_sub_months(Months::new(12))?;
    snapshots.iter().find(|s| s.period_date <= target)
}

/// Build the comparison from already-loaded data.
pub fn compare_security(
    security: &WatchedSecurity,
    snapshots: &[ValuationSnapshot],
    today: NaiveDate,
) -> Comparison {
    let prior = prior_snapshot(snapshots, today);
    let year_ago = year_ago_snapshot(snapshots, today);

    let build = |pipeline: Pipeline| {
        let current = security.intrinsic_value(pipeline);
        PipelineComparison {
            pipeline,
            current,
            vs_prior: Delta::against(current, prior, pipeline),
            vs_year_ago: Delta::against(current, year_ago, pipeline),
        }
    };

    Comparison {
        symbol: security.symbol.clone(),
        as_of: today,
        preferred_pipeline: security.preferred_pipeline,
        eps: build(Pipeline::Eps),
        fcf: build(Pipeline::Fcf),
    }
}

#[derive(Clone)]
pub struct ComparisonEngine {
    storage: Storage,
}

impl ComparisonEngine {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// `None` if the symbol is not on the watch list.
    pub async fn compare(&self, symbol: &str, today: NaiveDate) -> Result<Option<Comparison>> {
        let Some(security) = self.storage.get_security(symbol).await? else {
            return Ok(None);
        };
        let snapshots = self.storage.snapshots_for(&security.symbol).await?;
        Ok(Some(compare_security(&security, &snapshots, today)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
