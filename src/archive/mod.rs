//! Valuation history: quarterly snapshots and comparisons against them.

pub mod comparison;
pub mod period;
pub mod snapshot;
