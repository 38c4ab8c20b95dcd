//! Configuration module for Crawl-Fleet
//!
//! Configuration is layered: TOML file (optional), then environment variables,
//! then command-line overrides applied by the binary. It is loaded once at
//! startup and never mutated afterwards.
//!
//! # Example
//!
//! ```no_run
//! use crawl_fleet::config::{load_config, validate_supervisor};
//! use std::path::Path;
//!
//! let config = load_config(Some(Path::new("fleet.toml"))).unwrap();
//! validate_supervisor(&config).unwrap();
//! println!("Pool size: {}", config.supervisor.num_workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetchConfig, PressurePolicy, QueueConfig, SupervisorConfig, WorkerConfig};

// Re-export parser and validation functions
pub use parser::{apply_env, compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate_queue_connection, validate_supervisor, validate_worker};
