//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Durations are given in milliseconds in the file and exposed as
//! `std::time::Duration` through the accessor methods.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::fetcher::FetchPolicy;
use crate::engine::round::RoundConfig;
use crate::engine::session::SessionConfig;
use crate::sources::ValueSource;
use crate::storage::{DEFAULT_HIGH_SCORE_FILE, DEFAULT_HIGH_SCORE_KEY};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub round: RoundSection,
    pub fetch: FetchSection,
    pub session: SessionSection,
    pub storage: StorageSection,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoundSection {
    pub duration_ms: u64,
    pub tick_ms: u64,
    pub live_refresh_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchSection {
    pub max_retries_per_source: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    /// Served when every source fails and nothing is known yet.
    pub static_default: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSection {
    pub win_delay_ms: u64,
    pub loss_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSection {
    pub high_score_file: String,
    pub high_score_key: String,
}

/// One entry of the ordered `[[sources]]` array.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    /// Dotted JSON path to the price, e.g. `data.amount`.
    pub field: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        let source = |name: &str, url: &str, field: &str, enabled: bool| SourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            field: field.to_string(),
            enabled,
        };

        Self {
            round: RoundSection {
                duration_ms: 5_000,
                tick_ms: 100,
                live_refresh_ms: 1_000,
            },
            fetch: FetchSection {
                max_retries_per_source: 2,
                retry_delay_ms: 300,
                request_timeout_ms: 5_000,
                static_default: 92_350.0,
            },
            session: SessionSection {
                win_delay_ms: 1_500,
                loss_delay_ms: 3_000,
            },
            storage: StorageSection {
                high_score_file: DEFAULT_HIGH_SCORE_FILE.to_string(),
                high_score_key: DEFAULT_HIGH_SCORE_KEY.to_string(),
            },
            sources: vec![
                source("mempool", "https://mempool.space/api/v1/prices", "USD", true),
                source(
                    "coinbase",
                    "https://api.coinbase.com/v2/prices/BTC-USD/spot",
                    "data.amount",
                    true,
                ),
                source(
                    "binance",
                    "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT",
                    "price",
                    true,
                ),
                source(
                    "coingecko",
                    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd",
                    "bitcoin.usd",
                    false,
                ),
            ],
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.round.duration_ms == 0 {
            bail!("round.duration_ms must be greater than zero");
        }
        if self.round.tick_ms == 0 {
            bail!("round.tick_ms must be greater than zero");
        }
        if self.round.live_refresh_ms == 0 {
            bail!("round.live_refresh_ms must be greater than zero");
        }
        if self.fetch.max_retries_per_source == 0 {
            bail!("fetch.max_retries_per_source must be at least 1");
        }
        if !(self.fetch.static_default.is_finite() && self.fetch.static_default > 0.0) {
            bail!(
                "fetch.static_default must be a positive number, got {}",
                self.fetch.static_default
            );
        }
        if self.enabled_sources().next().is_none() {
            bail!("at least one enabled [[sources]] entry is required");
        }
        for src in &self.sources {
            if src.field.trim().is_empty() {
                bail!("source {} has an empty field path", src.name);
            }
        }
        Ok(())
    }

    /// Enabled sources in priority order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.request_timeout_ms)
    }

    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            duration: Duration::from_millis(self.round.duration_ms),
            tick_interval: Duration::from_millis(self.round.tick_ms),
            live_refresh_interval: Duration::from_millis(self.round.live_refresh_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            win_delay: Duration::from_millis(self.session.win_delay_ms),
            loss_delay: Duration::from_millis(self.session.loss_delay_ms),
        }
    }

    /// Retry settings paired with the already-built sources, primary first.
    pub fn fetch_policy(&self, sources: Vec<Arc<dyn ValueSource>>) -> FetchPolicy {
        FetchPolicy {
            max_retries_per_source: self.fetch.max_retries_per_source,
            retry_delay: Duration::from_millis(self.fetch.retry_delay_ms),
            source_order: sources,
        }
    }
}
