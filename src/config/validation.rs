use crate::config::types::{
    BackfillConfig, Config, DefaultsConfig, ScrapingConfig, StorageConfig, UserAgentConfig,
};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_storage_config(&config.storage)?;
    validate_scraping_config(&config.scraping)?;
    validate_defaults_config(&config.defaults)?;
    validate_backfill_config(&config.backfill)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> ConfigResult<()> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.logs_path.is_empty() {
        return Err(ConfigError::Validation(
            "logs_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates remote access settings
fn validate_scraping_config(config: &ScrapingConfig) -> ConfigResult<()> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.rate_limit_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "rate_limit_ms must be >= 100ms, got {}ms",
            config.rate_limit_ms
        )));
    }

    if config.retry_attempts < 1 || config.retry_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be between 1 and 10, got {}",
            config.retry_attempts
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_defaults_config(config: &DefaultsConfig) -> ConfigResult<()> {
    if config.min_elo < 0 {
        return Err(ConfigError::Validation(format!(
            "min_elo cannot be negative, got {}",
            config.min_elo
        )));
    }

    if let Some(max) = config.max_elo {
        if max < config.min_elo {
            return Err(ConfigError::Validation(format!(
                "max_elo ({}) must be >= min_elo ({})",
                max, config.min_elo
            )));
        }
    }

    if let Some(format) = &config.format {
        if format.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default format cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_backfill_config(config: &BackfillConfig) -> ConfigResult<()> {
    if config.batch_size < 1 || config.batch_size > 100 {
        return Err(ConfigError::Validation(format!(
            "backfill batch_size must be between 1 and 100, got {}",
            config.batch_size
        )));
    }

    if config.idle_backoff_secs < 1 {
        return Err(ConfigError::Validation(
            "idle_backoff_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    // Validate client name: non-empty, alphanumeric + hyphens only
    if config.client_name.is_empty() {
        return Err(ConfigError::Validation(
            "client_name cannot be empty".to_string(),
        ));
    }

    if !config
        .client_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "client_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.client_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}
