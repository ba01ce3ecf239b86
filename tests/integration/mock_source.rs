//! Mock price source for integration testing.
//!
//! Provides a deterministic `ValueSource` whose price is a function of
//! the (virtual) time since the source was created. An optional latency
//! simulates a slow endpoint.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use blitz::sources::ValueSource;
use blitz::types::FetchError;

type PriceFn = dyn Fn(Duration) -> Result<f64, FetchError> + Send + Sync;

pub struct MockSource {
    name: String,
    epoch: Instant,
    latency: Duration,
    price_at: Box<PriceFn>,
    calls: Arc<AtomicU32>,
}

impl MockSource {
    pub fn new<F>(name: &str, price_at: F) -> Self
    where
        F: Fn(Duration) -> Result<f64, FetchError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            epoch: Instant::now(),
            latency: Duration::ZERO,
            price_at: Box::new(price_at),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Always the same price.
    pub fn fixed(name: &str, price: f64) -> Self {
        Self::new(name, move |_| Ok(price))
    }

    /// `before` until `switch_at`, `after` from then on.
    pub fn stepped(name: &str, before: f64, after: f64, switch_at: Duration) -> Self {
        Self::new(name, move |elapsed| {
            Ok(if elapsed < switch_at { before } else { after })
        })
    }

    /// Every call fails with a 503.
    pub fn down(name: &str) -> Self {
        Self::new(name, |_| Err(FetchError::HttpStatus(503)))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Shared counter of `fetch` calls, readable after the source is moved.
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ValueSource for MockSource {
    async fn fetch(&self) -> Result<f64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.price_at)(self.epoch.elapsed())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
