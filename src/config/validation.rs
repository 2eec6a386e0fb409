use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("indexer.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("http.max_retries must allow at least one attempt")]
    ZeroAttempts,

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("Invalid proxy URL '{proxy}': {reason}")]
    InvalidProxy { proxy: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_http(config)?;
    validate_indexer(config)?;
    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    let http = &config.http;

    if http.max_retries == 0 {
        return Err(ValidationError::ZeroAttempts);
    }

    for (field, value) in [
        ("http.connect_timeout", http.connect_timeout),
        ("http.request_timeout", http.request_timeout),
    ] {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration { field });
        }
    }

    if let Some(proxy) = &http.proxy {
        url::Url::parse(proxy).map_err(|e| ValidationError::InvalidProxy {
            proxy: proxy.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

fn validate_indexer(config: &Config) -> Result<(), ValidationError> {
    if config.indexer.concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    if config.indexer.progress_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "indexer.progress_interval",
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = Config::default();
        config.indexer.concurrency = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_zero_attempts() {
        let mut config = Config::default();
        config.http.max_retries = 0;
        assert!(matches!(validate(&config), Err(ValidationError::ZeroAttempts)));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = Config::default();
        config.http.request_timeout = HumanDuration::from_millis(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration {
                field: "http.request_timeout"
            })
        ));
    }

    #[test]
    fn test_zero_progress_interval() {
        let mut config = Config::default();
        config.indexer.progress_interval = HumanDuration::from_millis(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_proxy() {
        let mut config = Config::default();
        config.http.proxy = Some("::not-a-url".to_string());
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidProxy { .. })
        ));
    }
}
