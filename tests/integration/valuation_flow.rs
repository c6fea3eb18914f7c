//! Valuation run, fundamentals caching, snapshots and comparisons.

use chrono::NaiveDate;

use valuewatch::archive::snapshot::SnapshotRequest;
use valuewatch::types::{Pipeline, PipelineOutcome, WatchError};

use crate::harness;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[tokio::test]
async fn test_eps_succeeds_while_fcf_lacks_history() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9, 12.5e9]);

    let summary = h.app.compute_valuations(None, false).await.unwrap();
    let item = summary.item("AAPL").unwrap();

    assert_eq!(item.eps.outcome, PipelineOutcome::Success { value: 122.39 });
    assert!(item.fcf.outcome.is_skipped());
    assert_eq!(summary.counts(Pipeline::Eps).success, 1);
    assert_eq!(summary.counts(Pipeline::Fcf).skipped, 1);
}

#[tokio::test]
async fn test_fcf_per_share_and_negative_case() {
    let h = harness(&["AAPL", "BURN"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9; 4]);
    h.provider.set_overview("BURN", None, Some(1e9));
    h.provider.set_cash_flow("BURN", &[-0.5e9; 4]);

    h.app.compute_valuations(None, false).await.unwrap();

    let aapl = h.app.storage().get_security("AAPL").await.unwrap().unwrap();
    assert_eq!(aapl.fcf_per_share, Some(3.33));
    assert_eq!(aapl.fcf_intrinsic_value, Some(68.0));

    let burn = h.app.storage().get_security("BURN").await.unwrap().unwrap();
    assert_eq!(burn.fcf_per_share, Some(-2.0));
    assert_eq!(burn.fcf_intrinsic_value, None);
    assert_eq!(burn.eps_intrinsic_value, None);
}

#[tokio::test]
async fn test_turn_to_negative_fundamentals_clears_stale_values() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9; 4]);
    h.app.compute_valuations(None, false).await.unwrap();

    h.provider.set_overview("AAPL", Some(-0.5), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[-5e9; 4]);
    let summary = h.app.compute_valuations(None, true).await.unwrap();
    assert_eq!(summary.eps.skipped, 1);
    assert_eq!(summary.fcf.skipped, 1);

    let stored = h.app.storage().get_security("AAPL").await.unwrap().unwrap();
    assert_eq!(stored.fcf_per_share, Some(-1.33));
    assert_eq!(stored.fcf_intrinsic_value, None);
    assert_eq!(stored.trailing_eps, Some(-0.5));
    assert_eq!(stored.eps_intrinsic_value, None);
    assert_eq!(stored.effective_intrinsic_value(), None);
}

#[tokio::test]
async fn test_fundamentals_served_from_cache_until_forced() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9; 4]);

    h.app.compute_valuations(None, false).await.unwrap();
    h.app.compute_valuations(None, false).await.unwrap();
    assert_eq!(h.provider.calls("overview"), 1);
    assert_eq!(h.provider.calls("cash_flow"), 1);

    h.app.compute_valuations(None, true).await.unwrap();
    assert_eq!(h.provider.calls("overview"), 2);
    assert_eq!(h.provider.calls("cash_flow"), 2);
}

#[tokio::test]
async fn test_upstream_failure_is_not_cached_and_keeps_values() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9; 4]);
    h.app.compute_valuations(None, false).await.unwrap();

    h.provider
        .set_outage(Some(WatchError::UpstreamRateLimited("5 calls per minute".into())));
    let summary = h.app.compute_valuations(None, true).await.unwrap();
    assert_eq!(summary.eps.errored, 1);

    let stored = h.app.storage().get_security("AAPL").await.unwrap().unwrap();
    assert_eq!(stored.eps_intrinsic_value, Some(122.39));
    assert_eq!(stored.fcf_intrinsic_value, Some(68.0));

    // The failed refresh did not evict the good entry.
    h.provider.set_outage(None);
    h.app.compute_valuations(None, false).await.unwrap();
    assert_eq!(h.provider.calls("overview"), 2);
}

#[tokio::test]
async fn test_snapshot_then_compare_quarter_over_quarter() {
    let h = harness(&["AAPL", "IBM"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9; 4]);
    h.app.compute_valuations(None, false).await.unwrap();

    let request = SnapshotRequest::default();
    let summary = h
        .app
        .create_quarterly_snapshot_on(&request, d(2026, 7, 15))
        .await
        .unwrap();
    assert_eq!(summary.period, d(2026, 7, 1));
    assert_eq!(summary.created, 1);
    assert_eq!(summary.no_data, 1);
    assert_eq!(summary.errored, 0);

    // Second run in the same quarter changes nothing.
    let again = h
        .app
        .create_quarterly_snapshot_on(&request, d(2026, 8, 1))
        .await
        .unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.skipped, 1);

    // Earnings grew: 6.00 -> 7.00.
    h.provider.set_overview("AAPL", Some(7.0), Some(15e9));
    h.app.compute_valuations(None, true).await.unwrap();

    let cmp = h.app.compare_on("AAPL", d(2026, 10, 16)).await.unwrap().unwrap();
    assert_eq!(cmp.eps.current, Some(142.79));
    assert_eq!(cmp.eps.vs_prior.base_value, Some(122.39));
    assert_eq!(cmp.eps.vs_prior.absolute, Some(20.4));
    assert_eq!(cmp.eps.vs_prior.percent, Some(16.67));
    assert_eq!(cmp.eps.vs_year_ago.absolute, None);

    // FCF unchanged.
    assert_eq!(cmp.fcf.vs_prior.absolute, Some(0.0));
    assert_eq!(cmp.fcf.vs_prior.percent, Some(0.0));
}

#[tokio::test]
async fn test_forced_snapshot_replaces_period() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[12.5e9; 4]);
    h.app.compute_valuations(None, false).await.unwrap();

    let plain = SnapshotRequest::default();
    h.app.create_quarterly_snapshot_on(&plain, d(2026, 10, 16)).await.unwrap();

    h.provider.set_overview("AAPL", Some(7.0), Some(15e9));
    h.app.compute_valuations(None, true).await.unwrap();

    let forced = SnapshotRequest {
        force: true,
        ..Default::default()
    };
    let summary = h.app.create_quarterly_snapshot_on(&forced, d(2026, 10, 16)).await.unwrap();
    assert_eq!(summary.created, 1);

    let snaps = h.app.storage().snapshots_for("AAPL").await.unwrap();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].period_date, d(2026, 10, 1));
    assert_eq!(snaps[0].eps_intrinsic_value, Some(142.79));
}
