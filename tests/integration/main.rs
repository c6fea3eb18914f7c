//! End-to-end tests against the full application stack with a mock
//! provider and an in-memory SQLite database.

mod mock_provider;
mod scan_flow;
mod valuation_flow;

use std::sync::Arc;

use mock_provider::MockProvider;
use valuewatch::app::App;
use valuewatch::cache::{CacheBackend, MemoryCache};
use valuewatch::config::AppConfig;
use valuewatch::storage::Storage;
use valuewatch::types::{DcfAssumptions, WatchedSecurity};

pub struct Harness {
    pub app: Arc<App>,
    pub provider: Arc<MockProvider>,
}

pub async fn harness(symbols: &[&str]) -> Harness {
    harness_with_backend(symbols, Arc::new(MemoryCache::new())).await
}

pub async fn harness_with_backend(symbols: &[&str], backend: Arc<dyn CacheBackend>) -> Harness {
    let storage = Storage::in_memory().await.unwrap();
    for symbol in symbols {
        storage
            .save_security(&WatchedSecurity::new(symbol, DcfAssumptions::default()))
            .await
            .unwrap();
    }

    let provider = Arc::new(MockProvider::new());
    let app = App::new(storage, provider.clone(), backend, &AppConfig::default());
    Harness {
        app: Arc::new(app),
        provider,
    }
}
