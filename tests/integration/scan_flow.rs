//! Scan trigger, lock exclusion and results publication.

use std::sync::Arc;
use std::time::Duration;

use valuewatch::cache::results::ScanView;
use valuewatch::cache::{CacheBackend, MemoryCache};
use valuewatch::types::{ScanAck, ScanStatus, WatchError};

use crate::mock_provider::DownCache;
use crate::{harness, harness_with_backend, Harness};

async fn wait_for_finish(h: &Harness) -> ScanView {
    for _ in 0..200 {
        let view = h.app.scan_view();
        if matches!(view.status.status, ScanStatus::Completed | ScanStatus::Failed) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan did not finish");
}

#[tokio::test]
async fn test_scan_uses_valuations_from_storage() {
    let h = harness(&["AAPL", "KO"]).await;
    h.provider.set_overview("AAPL", Some(6.0), Some(15e9));
    h.provider.set_cash_flow("AAPL", &[1e9, 1e9]);
    h.provider.set_overview("KO", Some(-0.5), Some(4e9));
    h.provider.set_cash_flow("KO", &[1e9, 1e9, 1e9, 1e9]);
    h.provider.set_puts("AAPL", &[100.0, 120.0, 130.0]);
    h.provider.set_puts("KO", &[0.5, 1.0]);

    h.app.compute_valuations(None, false).await.unwrap();

    let ack = h.app.trigger_scan();
    assert!(matches!(ack, ScanAck::Accepted { .. }));
    let view = wait_for_finish(&h).await;

    assert_eq!(view.status.status, ScanStatus::Completed);
    assert_eq!(view.results.len(), 2);

    // AAPL: EPS 122.39 only, two strikes at or below it.
    let aapl = &view.results["AAPL"];
    assert_eq!(aapl.intrinsic_value, Some(122.39));
    assert_eq!(aapl.qualifying_contracts, 2);
    assert!(aapl.passes);
    assert_eq!(aapl.contracts[0].strike, 130.0);

    // KO: EPS skipped, falls back to FCF (1.00/share -> 20.40).
    let ko = &view.results["KO"];
    assert_eq!(ko.intrinsic_value, Some(20.4));
    assert!(ko.passes);
}

#[tokio::test]
async fn test_concurrent_triggers_admit_one() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_puts("AAPL", &[100.0]);

    let first = h.app.trigger_scan();
    let second = h.app.trigger_scan();

    let accepted = [&first, &second]
        .iter()
        .filter(|a| matches!(a, ScanAck::Accepted { .. }))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(second, ScanAck::AlreadyRunning);

    wait_for_finish(&h).await;
    assert_eq!(h.provider.calls("puts"), 1);
}

#[tokio::test]
async fn test_parallel_triggers_from_tasks() {
    let h = harness(&["AAPL"]).await;
    h.provider.set_puts("AAPL", &[100.0]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let app = Arc::clone(&h.app);
            tokio::spawn(async move { app.trigger_scan() })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), ScanAck::Accepted { .. }) {
            accepted += 1;
        }
    }
    // Passes may finish and release between triggers, but never overlap.
    assert!(accepted >= 1);
    wait_for_finish(&h).await;
    assert_eq!(h.provider.calls("puts"), accepted);
}

#[tokio::test]
async fn test_provider_outage_fails_scan_with_empty_results() {
    let h = harness(&["AAPL", "MSFT"]).await;
    h.provider
        .set_outage(Some(WatchError::UpstreamUnavailable("connection reset".into())));

    h.app.run_scan().await;
    let view = h.app.scan_view();

    assert_eq!(view.status.status, ScanStatus::Failed);
    assert!(view.results.is_empty());
    assert!(view.status.message.contains("all 2"));
}

#[tokio::test]
async fn test_cache_outage_reads_typed_defaults() {
    let h = harness_with_backend(&["AAPL"], Arc::new(DownCache)).await;
    h.provider.set_puts("AAPL", &[100.0]);

    // The lock cannot be taken, so no scan starts.
    assert_eq!(h.app.trigger_scan(), ScanAck::AlreadyRunning);
    assert_eq!(h.provider.calls("puts"), 0);

    let view = h.app.scan_view();
    assert!(view.results.is_empty());
    assert_eq!(view.status.message, "Status unavailable");

    let json = serde_json::to_value(&view).unwrap();
    assert!(json["results"].is_object());
}

#[tokio::test]
async fn test_expired_cache_entries_evicted() {
    let backend = Arc::new(MemoryCache::new());
    let h = harness_with_backend(&["AAPL"], backend.clone()).await;
    h.provider.set_puts("AAPL", &[10.0]);
    h.app.run_scan().await;

    backend
        .set("scan:stale", serde_json::json!(1), chrono::Duration::seconds(0))
        .unwrap();
    let live = backend.len();

    assert_eq!(h.app.evict_expired_cache(), 1);
    assert_eq!(backend.len(), live - 1);
    assert_eq!(h.app.scan_view().status.status, ScanStatus::Completed);
}
