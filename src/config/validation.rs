use crate::config::types::{Config, CrawlerConfig, DelayConfig, OutputConfig, ProxyConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_delay_config(&config.delay)?;
    validate_proxy_config(&config.proxy)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawl scope and bounds
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.start_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "start-url '{}' must use http or https",
            config.start_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "start-url '{}' has no host",
            config.start_url
        )));
    }

    if config.concurrency < 1 || config.concurrency > 50 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 50, got {}",
            config.concurrency
        )));
    }

    if config.test_mode && config.test_item_cap < 1 {
        return Err(ConfigError::Validation(
            "test-item-cap must be >= 1 when test-mode is on".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates pacing and retry settings
fn validate_delay_config(config: &DelayConfig) -> Result<(), ConfigError> {
    if !(0.0..=5.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 5.0, got {}",
            config.jitter
        )));
    }

    if !config.page_delay_multiplier.is_finite() || config.page_delay_multiplier < 0.0 {
        return Err(ConfigError::Validation(format!(
            "page-delay-multiplier must be a non-negative number, got {}",
            config.page_delay_multiplier
        )));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry-attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.blocked_backoff_multiplier < 1 {
        return Err(ConfigError::Validation(format!(
            "blocked-backoff-multiplier must be >= 1, got {}",
            config.blocked_backoff_multiplier
        )));
    }

    Ok(())
}

/// Validates the proxy pool
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    if config.servers.is_empty() {
        return Err(ConfigError::Validation(
            "proxy is enabled but no servers are listed".to_string(),
        ));
    }

    for server in &config.servers {
        Url::parse(server).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy server '{}': {}", server, e))
        })?;
    }

    if config.username.is_some() != config.password.is_some() {
        return Err(ConfigError::Validation(
            "proxy username and password must be set together".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
