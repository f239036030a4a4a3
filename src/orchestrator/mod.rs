//! Batch orchestration and the worker pool

mod context;
mod coordinator;
mod metrics;
mod processor;
mod worker;

pub use context::RunContext;
pub use coordinator::{Orchestrator, ProcessorSummary, RunSummary};
pub use metrics::{MetricsSnapshot, RequestMetrics};
pub use processor::{ProcessorConfig, ProcessorMode};
