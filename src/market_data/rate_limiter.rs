//! Fixed-spacing rate limiter for the market data provider.
//!
//! The provider grants a small calls-per-minute budget, so instead of a
//! token bucket every call start is spaced by a fixed minimum delay and
//! calls are serialised: a second caller waits until the first call has
//! finished and the spacing has elapsed.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::MarketDataProvider;
use crate::types::{CompanyOverview, PutOption, QuarterlyCashFlow, WatchError};

#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    /// Start time of the previous call; held for the duration of a call.
    last_call: Mutex<Option<Instant>>,
    name: String,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, spacing: Duration) -> Self {
        Self {
            spacing,
            last_call: Mutex::new(None),
            name: name.into(),
        }
    }

    /// Run `call` once the spacing since the previous call has elapsed.
    pub async fn run<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let ready_at = previous + self.spacing;
            let now = Instant::now();
            if ready_at > now {
                debug!(
                    limiter = %self.name,
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "Rate limited, waiting before next call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last_call = Some(Instant::now());
        call.await
    }
}

/// Wraps a provider so every call goes through one `RateLimiter`.
pub struct RateLimitedProvider<P> {
    inner: P,
    limiter: RateLimiter,
}

impl<P: MarketDataProvider> RateLimitedProvider<P> {
    pub fn new(inner: P, spacing: Duration) -> Self {
        let limiter = RateLimiter::new(inner.name(), spacing);
        Self { inner, limiter }
    }
}

#[async_trait]
impl<P: MarketDataProvider> MarketDataProvider for RateLimitedProvider<P> {
    async fn fetch_company_overview(&self, symbol: &str) -> Result<CompanyOverview, WatchError> {
        self.limiter.run(self.inner.fetch_company_overview(symbol)).await
    }

    async fn fetch_quarterly_cash_flow(
        &self,
        symbol: &str,
    ) -> Result<Vec<QuarterlyCashFlow>, WatchError> {
        self.limiter.run(self.inner.fetch_quarterly_cash_flow(symbol)).await
    }

    async fn fetch_put_options(&self, symbol: &str) -> Result<Vec<PutOption>, WatchError> {
        self.limiter.run(self.inner.fetch_put_options(symbol)).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
