use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "BUCKETSWEEP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/bucketsweep.toml";
const ENV_PREFIX: &str = "BUCKETSWEEP";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // BUCKETSWEEP__INDEXER__CONCURRENCY -> indexer.concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::OutputFormat;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.indexer.concurrency, 10);
        assert_eq!(config.indexer.format, OutputFormat::Url);
        assert_eq!(
            config.indexer.progress_interval.as_duration(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[http]
request_timeout = "15s"
max_retries = 5
retry_backoff = "250ms"
proxy = "http://proxy.internal:3128"

[indexer]
concurrency = 32
format = "csv"
append = true
output_dir = "out"
progress_interval = "1s"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.http.request_timeout.as_duration(), Duration::from_secs(15));
        assert_eq!(config.http.max_retries, 5);
        assert_eq!(config.http.retry_backoff.as_duration(), Duration::from_millis(250));
        assert_eq!(config.http.proxy.as_deref(), Some("http://proxy.internal:3128"));
        assert_eq!(config.indexer.concurrency, 32);
        assert_eq!(config.indexer.format, OutputFormat::Csv);
        assert!(config.indexer.append);
        assert_eq!(config.indexer.output_dir, PathBuf::from("out"));
    }
}
