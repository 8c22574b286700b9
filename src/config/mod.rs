//! Configuration module for Replay-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; anything left out falls back to the defaults below.
//!
//! # Example
//!
//! ```no_run
//! use replay_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Requests are spaced {}ms apart", config.scraping.rate_limit_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackfillConfig, Config, DefaultsConfig, ScrapingConfig, StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_or_default, load_config_with_hash};
pub use validation::validate;
