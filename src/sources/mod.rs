//! Price sources.
//!
//! Defines the `ValueSource` trait and the HTTP/JSON implementation used
//! for the public price endpoints. A source makes exactly one request per
//! `fetch` call; retries and fallback live in the engine's fetcher.

pub mod http;

use async_trait::async_trait;

use crate::types::FetchError;

/// Abstraction over one external provider of the tracked price.
///
/// Sources are stateless and ordered by priority in the fetch policy.
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// Fetch the current value once. Non-finite or non-positive values
    /// must be reported as `FetchError::InvalidValue`.
    async fn fetch(&self) -> Result<f64, FetchError>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}
