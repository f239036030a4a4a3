//! Completion pipeline
//!
//! Runs after extraction: validate required fields, upsert the entity,
//! submit it downstream in production, then update the frontier record.

mod completion;
mod snapshot;
mod submission;
mod validation;

pub use completion::{CompletionJob, CompletionOutcome, CompletionPipeline};
pub use snapshot::SnapshotSink;
pub use submission::{HttpSubmitter, Submitter};
pub use validation::validate_required;

use crate::extract::ExtractError;
use crate::frontier::FrontierError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed for {url}: empty required fields {fields:?}")]
    Validation { url: String, fields: Vec<String> },

    #[error("Required field '{0}' is not an entity field")]
    UnknownRequiredField(String),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Submission failed for {url} (status {status:?}): {message}")]
    Submission {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] FrontierError),
}

impl PipelineError {
    /// Returns true for errors caused by the processor definition itself
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::UnknownRequiredField(_) => true,
            Self::Extract(e) => e.is_configuration(),
            _ => false,
        }
    }
}
