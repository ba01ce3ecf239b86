//! HTTP/JSON price source.
//!
//! Issues a plain GET against a public price endpoint and pulls the price
//! out of the JSON body with a dotted field path. Endpoints disagree on
//! encoding, so the field may hold a JSON number (`{"USD": 92350}`) or a
//! numeric string (`{"data": {"amount": "92350.12"}}`).
//!
//! Known endpoints:
//! - mempool:   `https://mempool.space/api/v1/prices` → `USD`
//! - coinbase:  `https://api.coinbase.com/v2/prices/BTC-USD/spot` → `data.amount`
//! - binance:   `https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT` → `price`
//! - coingecko: `https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd` → `bitcoin.usd`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::ValueSource;
use crate::config::SourceConfig;
use crate::types::{is_usable_price, FetchError};

// ---------------------------------------------------------------------------
// Field path
// ---------------------------------------------------------------------------

/// Dotted path into a JSON object, e.g. `data.amount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn resolve<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(body, |node, key| node.get(key.as_str()))
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Pull a usable price out of a parsed response body.
pub fn extract_price(body: &Value, path: &FieldPath) -> Result<f64, FetchError> {
    let node = path
        .resolve(body)
        .ok_or_else(|| FetchError::Parse(format!("missing field `{path}`")))?;

    let price = match node {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FetchError::Parse(format!("field `{path}` is not a float")))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FetchError::Parse(format!("field `{path}` is not numeric: {s:?}")))?,
        other => {
            return Err(FetchError::Parse(format!(
                "field `{path}` has unexpected type: {other}"
            )))
        }
    };

    if !is_usable_price(price) {
        return Err(FetchError::InvalidValue(price));
    }
    Ok(price)
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct HttpPriceSource {
    http: Client,
    name: String,
    url: String,
    field: FieldPath,
}

impl HttpPriceSource {
    pub fn new(name: &str, url: &str, field: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("BLITZ/0.1.0")
            .build()
            .with_context(|| format!("Failed to build HTTP client for source {name}"))?;

        Ok(Self {
            http,
            name: name.to_string(),
            url: url.to_string(),
            field: FieldPath::parse(field),
        })
    }

    pub fn from_config(cfg: &SourceConfig, timeout: Duration) -> Result<Self> {
        Self::new(&cfg.name, &cfg.url, &cfg.field, timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ValueSource for HttpPriceSource {
    async fn fetch(&self) -> Result<f64, FetchError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("malformed JSON: {e}")))?;

        let price = extract_price(&body, &self.field)?;
        debug!(source = %self.name, price, "Parsed price");
        Ok(price)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
