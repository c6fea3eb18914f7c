//! Snapshot period resolution.
//!
//! Periods are quarter-start dates: Jan 1, Apr 1, Jul 1 and Oct 1.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

const QUARTER_START_MONTHS: [u32; 4] = [1, 4, 7, 10];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPeriod {
    pub date: NaiveDate,
    /// Non-fatal note about an explicit override date.
    pub warning: Option<String>,
}

/// The quarter-start date on or before `date`.
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    // Day 1 of months 1/4/7/10 always exists.
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

pub fn is_quarter_start(date: NaiveDate) -> bool {
    date.day() == 1 && QUARTER_START_MONTHS.contains(&date.month())
}

/// Use `requested` as given (backfill), or default to the most recent
/// quarter start not after `today`.
pub fn resolve_period(requested: Option<NaiveDate>, today: NaiveDate) -> ResolvedPeriod {
    let Some(date) = requested else {
        return ResolvedPeriod {
            date: quarter_start(today),
            warning: None,
        };
    };

    let mut notes = Vec::new();
    if !is_quarter_start(date) {
        notes.push(format!(
            "{date} is not a quarter start (nearest earlier boundary is {})",
            quarter_start(date)
        ));
    }
    if date > today {
        notes.push(format!("{date} is in the future"));
    }

    ResolvedPeriod {
        date,
        warning: (!notes.is_empty()).then(|| notes.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_quarter_start() {
        assert_eq!(quarter_start(d(2026, 10, 16)), d(2026, 10, 1));
        assert_eq!(quarter_start(d(2026, 3, 31)), d(2026, 1, 1));
        assert_eq!(quarter_start(d(2026, 4, 1)), d(2026, 4, 1));
        assert_eq!(quarter_start(d(2026, 12, 31)), d(2026, 10, 1));
    }

    #[test]
    fn test_is_quarter_start() {
        assert!(is_quarter_start(d(2026, 7, 1)));
        assert!(!is_quarter_start(d(2026, 7, 2)));
        assert!(!is_quarter_start(d(2026, 2, 1)));
    }

    #[test]
    fn test_default_period() {
        let resolved = resolve_period(None, d(2026, 10, 16));
        assert_eq!(resolved.date, d(2026, 10, 1));
        assert!(resolved.warning.is_none());
    }

    #[test]
    fn test_aligned_override_no_warning() {
        let resolved = resolve_period(Some(d(2025, 4, 1)), d(2026, 10, 16));
        assert_eq!(resolved.date, d(2025, 4, 1));
        assert!(resolved.warning.is_none());
    }

    #[test]
    fn test_unaligned_override_kept_with_warning() {
        let resolved = resolve_period(Some(d(2025, 5, 15)), d(2026, 10, 16));
        assert_eq!(resolved.date, d(2025, 5, 15));
        let warning = resolved.warning.unwrap();
        assert!(warning.contains("not a quarter start"));
        assert!(warning.contains("2025-04-01"));
    }
}
