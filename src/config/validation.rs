use crate::config::types::{Config, FetchConfig, QueueConfig, SupervisorConfig, WorkerConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates everything a supervisor process needs before spawning workers
pub fn validate_supervisor(config: &Config) -> ConfigResult<()> {
    validate_supervisor_config(&config.supervisor)?;
    validate_worker(config)
}

/// Validates everything a single worker process needs
pub fn validate_worker(config: &Config) -> ConfigResult<()> {
    validate_queue_connection(&config.queue)?;
    validate_session(&config.queue)?;
    validate_worker_config(&config.worker)?;
    validate_fetch_config(&config.fetch)?;
    Ok(())
}

/// Validates the credentials and base URL of the queue API
///
/// This is the only check `check-connection` needs; a session is not required.
pub fn validate_queue_connection(config: &QueueConfig) -> ConfigResult<()> {
    if config.base_url.trim().is_empty() {
        return Err(ConfigError::MissingCredential("API_BASE_URL"));
    }
    if config.api_token.trim().is_empty() {
        return Err(ConfigError::MissingCredential("API_TOKEN"));
    }
    if config.user_id.trim().is_empty() {
        return Err(ConfigError::MissingCredential("USER_ID"));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.lease_max_attempts < 1 {
        return Err(ConfigError::Validation(
            "lease-max-attempts must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    for (name, path) in [
        ("lease-path", &config.lease_path),
        ("report-path", &config.report_path),
        ("submit-path", &config.submit_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "{} must start with '/', got '{}'",
                name, path
            )));
        }
    }

    Ok(())
}

fn validate_session(config: &QueueConfig) -> ConfigResult<()> {
    match config.session.as_deref().map(str::trim) {
        Some(session) if !session.is_empty() => Ok(()),
        _ => Err(ConfigError::MissingCredential("session")),
    }
}

fn validate_supervisor_config(config: &SupervisorConfig) -> ConfigResult<()> {
    if config.num_workers < 1 || config.num_workers > 256 {
        return Err(ConfigError::Validation(format!(
            "num-workers must be between 1 and 256, got {}",
            config.num_workers
        )));
    }

    if !(config.max_memory_percent > 0.0 && config.max_memory_percent <= 100.0) {
        return Err(ConfigError::Validation(format!(
            "max-memory-percent must be in (0, 100], got {}",
            config.max_memory_percent
        )));
    }

    if config.max_temp <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "max-temp must be positive, got {}",
            config.max_temp
        )));
    }

    if config.tick_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "tick-interval-secs must be >= 1".to_string(),
        ));
    }

    if config.restart_interval_secs < config.tick_interval_secs {
        return Err(ConfigError::Validation(format!(
            "restart-interval-secs ({}) must not be shorter than tick-interval-secs ({})",
            config.restart_interval_secs, config.tick_interval_secs
        )));
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> ConfigResult<()> {
    if config.idle_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "idle-interval-secs must be >= 1".to_string(),
        ));
    }

    if config.stats_every < 1 {
        return Err(ConfigError::Validation(
            "stats-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> ConfigResult<()> {
    if config.max_body_bytes < config.min_content_length {
        return Err(ConfigError::Validation(format!(
            "max-body-bytes ({}) must be at least min-content-length ({})",
            config.max_body_bytes, config.min_content_length
        )));
    }

    if config.tier_retry_attempts > 5 {
        return Err(ConfigError::Validation(format!(
            "tier-retry-attempts must be <= 5, got {}",
            config.tier_retry_attempts
        )));
    }

    if config.browser_enabled {
        Url::parse(&config.webdriver_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver-url: {}", e)))?;
    }

    Ok(())
}
