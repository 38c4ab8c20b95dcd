use crate::config::types::Config;
use crate::{ConfigError, ConfigResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads a configuration file and applies the process environment on top
///
/// A missing `path` yields the built-in defaults. Validation is left to the
/// caller because command-line overrides are applied after loading.
///
/// # Arguments
///
/// * `path` - Optional path to a TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration with environment overrides applied
/// * `Err(ConfigError)` - Failed to read or parse the file, or a bad env value
pub fn load_config(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = match path {
        Some(path) => parse_config(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;

    Ok(config)
}

/// Parses TOML configuration content
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    Ok(toml::from_str(content)?)
}

/// Overlays environment variables onto a configuration
///
/// Recognised variables:
///
/// | Variable | Setting |
/// |----------|---------|
/// | `API_BASE_URL` | `queue.base-url` |
/// | `API_TOKEN` | `queue.api-token` |
/// | `USER_ID` | `queue.user-id` |
/// | `MAX_WORKERS` | `supervisor.num-workers` |
/// | `MAX_MEMORY_PERCENT` | `supervisor.max-memory-percent` |
/// | `MAX_CPU_TEMP` | `supervisor.max-temp` |
/// | `WEBDRIVER_URL` | `fetch.webdriver-url` |
///
/// `lookup` is injected so tests do not have to mutate the process environment.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("API_BASE_URL") {
        config.queue.base_url = value;
    }
    if let Some(value) = lookup("API_TOKEN") {
        config.queue.api_token = value;
    }
    if let Some(value) = lookup("USER_ID") {
        config.queue.user_id = value;
    }
    if let Some(value) = lookup("WEBDRIVER_URL") {
        config.fetch.webdriver_url = value;
    }
    if let Some(value) = lookup("MAX_WORKERS") {
        config.supervisor.num_workers = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                name: "MAX_WORKERS",
                value,
            })?;
    }
    if let Some(value) = lookup("MAX_MEMORY_PERCENT") {
        config.supervisor.max_memory_percent =
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "MAX_MEMORY_PERCENT",
                value,
            })?;
    }
    if let Some(value) = lookup("MAX_CPU_TEMP") {
        config.supervisor.max_temp = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                name: "MAX_CPU_TEMP",
                value,
            })?;
    }

    Ok(())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup by both the supervisor and every worker so their logs
/// can be matched to the same configuration.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its file hash
///
/// The hash is `None` when running on defaults without a file.
pub fn load_config_with_hash(path: Option<&Path>) -> ConfigResult<(Config, Option<String>)> {
    let config = load_config(path)?;
    let hash = path.map(compute_config_hash).transpose()?;
    Ok((config, hash))
}
