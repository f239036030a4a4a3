//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Batch size: {}", config.engine.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackendKind, Config, CookieConsentConfig, EngineConfig, Environment, FieldEntry,
    NavigationConfig, OutputConfig, ProcessorEntry, ProcessorKind, ProxyConfig, RateLimitConfig,
    SiteEntry, SubmissionConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_proxy_strategy;
