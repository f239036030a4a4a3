//! Downstream submission API client

use crate::config::SubmissionConfig;
use crate::extract::Entity;
use crate::pipeline::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Receives persisted entities
///
/// Submission happens after persistence and is retried with the URL, so
/// implementations must tolerate receiving the same entity more than once.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, entity: &Entity) -> Result<(), PipelineError>;
}

/// JSON-over-HTTP submitter with basic auth
pub struct HttpSubmitter {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl HttpSubmitter {
    pub fn new(config: &SubmissionConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Submission {
                url: config.endpoint.clone(),
                status: None,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Stable key derived from the entity url, sent as `Idempotency-Key`
    pub fn idempotency_key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, entity: &Entity) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header("Idempotency-Key", Self::idempotency_key(&entity.url))
            .json(entity)
            .send()
            .await
            .map_err(|e| PipelineError::Submission {
                url: entity.url.clone(),
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::Submission {
            url: entity.url.clone(),
            status: Some(status.as_u16()),
            message: body,
        })
    }
}
