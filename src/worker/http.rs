//! HTTP client for fetching listing pages

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetchError, PageFetcher};
use crate::config::HttpConfig;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Longest pause between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Unauthenticated listing fetcher with bounded retry
pub struct HttpFetcher {
    client: Client,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout.as_duration())
            .timeout(config.request_timeout.as_duration())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        // Configure proxy if provided
        if let Some(url) = &config.proxy {
            let proxy = Proxy::all(url)
                .map_err(|e| FetchError::InvalidUrl(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            max_attempts: config.max_retries.max(1),
            retry_backoff: config.retry_backoff.as_duration(),
        })
    }

    /// Pause after failed attempt `attempt` (1-based): base, 2x base, 4x base,
    /// and so on, capped at `MAX_BACKOFF`
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Fetch once (no retry)
    async fn fetch_once(&self, url: &str) -> Result<Bytes> {
        debug!(url, "Fetching page");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else if e.is_redirect() {
                FetchError::TooManyRedirects
            } else if e.is_builder() {
                FetchError::InvalidUrl(e.to_string())
            } else {
                FetchError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::RequestFailed(format!("Failed to read body: {}", e))
            }
        })?;

        debug!(url, size = bytes.len(), "Page fetched");

        Ok(bytes)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.fetch_once(url).await {
                Ok(bytes) => {
                    if attempts > 1 {
                        debug!(url, attempts, "Fetch succeeded after retry");
                    }
                    return Ok(bytes);
                }
                Err(e) if matches!(e, FetchError::InvalidUrl(_)) => return Err(e),
                Err(e) => {
                    if attempts >= self.max_attempts {
                        warn!(url, attempts, error = %e, "Fetch failed after retries");
                        return Err(e);
                    }

                    warn!(url, attempts, error = %e, "Fetch failed, retrying");

                    tokio::time::sleep(self.backoff_for(attempts)).await;
                }
            }
        }
    }
}
