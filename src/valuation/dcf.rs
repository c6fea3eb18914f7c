//! Discounted cash flow primitive.
//!
//! Both valuation pipelines call `present_value` with their own per-share
//! base figure; nothing here knows which pipeline is asking.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::WatchError;

/// Present value of `base` grown for `years` periods at `growth_rate`, plus
/// a terminal value of `multiple` times the final projected figure, all
/// discounted back at `discount_rate`.
///
/// PV = Σ_{t=1..n} base·(1+g)^t / (1+r)^t  +  base·(1+g)^n · multiple / (1+r)^n
///
/// Intermediate terms stay unrounded; only the sum is rounded to cents.
pub fn present_value(
    base: f64,
    growth_rate: f64,
    multiple: f64,
    discount_rate: f64,
    years: u32,
) -> f64 {
    let growth = 1.0 + growth_rate;
    let discount = 1.0 + discount_rate;

    let mut projected = base;
    let mut factor = 1.0;
    let mut total = 0.0;
    for _ in 0..years {
        projected *= growth;
        factor *= discount;
        total += projected / factor;
    }

    let terminal = projected * multiple / factor;
    round_cents(total + terminal)
}

/// Every DCF input must be strictly positive (and finite).
pub fn validate_inputs(
    growth_rate: f64,
    multiple: f64,
    discount_rate: f64,
    years: u32,
) -> Result<(), WatchError> {
    let checks = [
        ("growth rate", growth_rate),
        ("terminal multiple", multiple),
        ("desired return", discount_rate),
    ];
    for (name, value) in checks {
        if !value.is_finite() || value <= 0.0 {
            return Err(WatchError::InvalidAssumptions(format!(
                "{name} must be positive, got {value}"
            )));
        }
    }
    if years == 0 {
        return Err(WatchError::InvalidAssumptions(
            "projection years must be positive, got 0".into(),
        ));
    }
    Ok(())
}

/// Round to 2 decimal places, half away from zero.
///
/// Non-finite input is returned unchanged.
pub fn round_cents(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
