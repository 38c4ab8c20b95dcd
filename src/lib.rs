//! Crawl-Fleet: a resource-aware pool of isolated crawl workers
//!
//! A supervisor process keeps a fleet of worker processes alive, sized against
//! host memory and temperature ceilings. Each worker leases URLs from a remote
//! job queue, runs them through an escalating chain of fetch strategies, and
//! reports results and newly discovered links back to the queue.

pub mod config;
pub mod crawler;
pub mod queue;
pub mod supervisor;
pub mod url;

use thiserror::Error;

/// Main error type for Crawl-Fleet operations
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: String,
        source: std::io::Error,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing required setting: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("URL looks like a file download: {0}")]
    LikelyDownload(String),
}

/// Result type alias for Crawl-Fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlTask, FetchResult, FetchStatus};
pub use queue::{RemoteQueueClient, TaskQueue};
pub use supervisor::{PoolState, ResourceSnapshot, WorkerSupervisor};
