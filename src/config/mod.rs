//! Configuration management for bucketsweep
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BUCKETSWEEP__<section>__<key>`
//!
//! Examples:
//! - `BUCKETSWEEP__INDEXER__CONCURRENCY=32`
//! - `BUCKETSWEEP__HTTP__REQUEST_TIMEOUT=30s`
//! - `BUCKETSWEEP__HTTP__PROXY=http://127.0.0.1:8080`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/bucketsweep.toml`.
//! This can be overridden using the `BUCKETSWEEP_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{Config, HttpConfig, IndexerConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`BUCKETSWEEP__*`)
    /// 2. TOML file (default: `config/bucketsweep.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation, e.g. after command-line overrides were applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
