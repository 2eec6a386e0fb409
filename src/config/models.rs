use crate::humanize::HumanDuration;
use crate::sink::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Per-request deadline; a stalled listing request fails after this
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    /// Total attempts per page, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
            user_agent: default_user_agent(),
            proxy: None,
        }
    }
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_user_agent() -> String {
    format!("bucketsweep/{}", env!("CARGO_PKG_VERSION"))
}

/// Indexing pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Maximum number of buckets swept at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub format: OutputFormat,
    /// Append to existing output files instead of truncating them
    #[serde(default)]
    pub append: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: HumanDuration,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            format: OutputFormat::default(),
            append: false,
            output_dir: default_output_dir(),
            progress_interval: default_progress_interval(),
            show_progress: default_show_progress(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_progress_interval() -> HumanDuration {
    HumanDuration::from_millis(500)
}

fn default_show_progress() -> bool {
    true
}
