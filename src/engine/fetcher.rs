//! Resilient price fetcher.
//!
//! Walks the configured sources in priority order, retrying each one a
//! bounded number of times with a fixed pause between attempts. The first
//! success wins and later sources are never contacted. When every attempt
//! fails the fetcher degrades to the last known price, or to the static
//! default if nothing usable is known. It never returns an error.
//!
//! Attempts are strictly sequential, so the worst case is bounded by
//! `sources * max_retries * (request_timeout + retry_delay)`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::sources::ValueSource;
use crate::types::{format_price, is_usable_price, FetchOutcome};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry and ordering policy for one fetch sequence.
#[derive(Clone)]
pub struct FetchPolicy {
    /// Attempts per source, at least 1.
    pub max_retries_per_source: u32,
    /// Pause between two attempts against the same source.
    pub retry_delay: Duration,
    /// Sources in priority order (primary first).
    pub source_order: Vec<Arc<dyn ValueSource>>,
}

impl FetchPolicy {
    /// Upper bound on attempts for one fetch sequence.
    pub fn max_attempts(&self) -> u32 {
        self.source_order.len() as u32 * self.max_retries_per_source.max(1)
    }
}

impl fmt::Debug for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.source_order.iter().map(|s| s.name()).collect();
        f.debug_struct("FetchPolicy")
            .field("max_retries_per_source", &self.max_retries_per_source)
            .field("retry_delay", &self.retry_delay)
            .field("source_order", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResilientFetcher {
    policy: FetchPolicy,
    static_default: f64,
}

impl ResilientFetcher {
    pub fn new(policy: FetchPolicy, static_default: f64) -> Self {
        Self {
            policy,
            static_default,
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn static_default(&self) -> f64 {
        self.static_default
    }

    /// Fetch a usable value, silently degrading when every source fails.
    pub async fn fetch_value(&self, last_known: Option<f64>) -> f64 {
        self.fetch(last_known).await.value
    }

    /// Fetch a usable value and report whether it came from a fallback.
    pub async fn fetch(&self, last_known: Option<f64>) -> FetchOutcome {
        let retries = self.policy.max_retries_per_source.max(1);
        let mut attempts = 0u32;

        for source in &self.policy.source_order {
            for attempt in 1..=retries {
                attempts += 1;
                match source.fetch().await {
                    Ok(price) if is_usable_price(price) => {
                        info!(
                            source = source.name(),
                            price = %format_price(price),
                            attempt,
                            "Price fetch succeeded"
                        );
                        return FetchOutcome::live(price, source.name(), attempts);
                    }
                    Ok(price) => {
                        warn!(source = source.name(), attempt, price, "Source returned unusable price");
                    }
                    Err(e) => {
                        warn!(source = source.name(), attempt, error = %e, "Price fetch failed");
                    }
                }

                if attempt < retries {
                    debug!(
                        source = source.name(),
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        "Retrying source"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }

        let (value, used_last_known) = match last_known {
            Some(v) if is_usable_price(v) => (v, true),
            _ => (self.static_default, false),
        };
        warn!(
            attempts,
            fallback = %format_price(value),
            used_last_known,
            "All price sources failed, serving fallback"
        );
        FetchOutcome::fallback(value, attempts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
