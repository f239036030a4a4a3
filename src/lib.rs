//! Harvester: a concurrent web-harvesting engine
//!
//! This crate drains per-site URL frontiers through pluggable navigation
//! backends, maps pages into structured entities with a declarative field
//! schema, and drives every URL through a persistent retry/completion state
//! machine.

pub mod config;
pub mod export;
pub mod extract;
pub mod frontier;
pub mod navigation;
pub mod orchestrator;
pub mod pipeline;
pub mod proxy;
pub mod site;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] frontier::FrontierError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] navigation::NavigationError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl HarvestError {
    /// Returns true for the fatal-configuration class, the only errors
    /// allowed to halt a run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Extract(e) => e.is_configuration(),
            Self::Pipeline(e) => e.is_configuration(),
            _ => false,
        }
    }
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

    #[error("Proxy strategy '{0}' requires at least one proxy server")]
    EmptyProxyPool(String),

    #[error("Unsupported field rule for '{field}': {reason}")]
    UnsupportedFieldRule { field: String, reason: String },
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::{Entity, FieldResolver, Schema};
pub use frontier::{RecordState, SharedFrontier, SqliteFrontier, UrlRecord};
pub use orchestrator::{Orchestrator, ProcessorConfig, RunSummary};
pub use proxy::{ProxyAllocator, ProxyDescriptor, ProxyStrategy};
