//! Sweep workers
//!
//! A worker owns one bucket sweep: it fetches listing pages through a
//! [`PageFetcher`], streams each key to the job's sink, and reports back to
//! the indexer when the listing is exhausted, fails, or is interrupted.

pub mod http;
pub(crate) mod runner;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use http::HttpFetcher;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,
}

/// Source of listing page bodies.
///
/// Any non-2xx response or transport failure is a [`FetchError`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}
