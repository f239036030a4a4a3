use crate::config::Environment;
use crate::extract::Entity;
use crate::frontier::SharedFrontier;
use crate::pipeline::snapshot::SnapshotSink;
use crate::pipeline::submission::Submitter;
use crate::pipeline::validation::validate_required;
use crate::pipeline::PipelineError;
use std::sync::Arc;

/// Per-processor settings the pipeline needs for one record
#[derive(Debug, Clone, Copy)]
pub struct CompletionJob<'a> {
    pub site: &'a str,
    /// Frontier collection the url came from
    pub source: &'a str,
    /// Entity collection receiving the mapped record
    pub destination: &'a str,
    pub required_fields: &'a [String],
    pub validation_retryable: bool,
    pub skip_completion: bool,
    pub allow_duplicates: bool,
}

/// What happened to one mapped entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Persisted, submitted when applicable, and marked complete
    Completed,
    /// Persisted but left pending because the processor skips completion
    Persisted,
    /// Required fields were empty; nothing was persisted
    ValidationFailed { terminal: bool },
    /// Persisted but the downstream API refused it; the url was marked error
    SubmissionFailed,
}

impl CompletionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Persisted)
    }
}

/// Validates, persists, submits and updates frontier state
#[derive(Clone)]
pub struct CompletionPipeline {
    frontier: SharedFrontier,
    submitter: Option<Arc<dyn Submitter>>,
    snapshots: SnapshotSink,
    environment: Environment,
    ignore_retry_on_validation: bool,
}

impl CompletionPipeline {
    pub fn new(frontier: SharedFrontier, environment: Environment) -> Self {
        Self {
            frontier,
            submitter: None,
            snapshots: SnapshotSink::disabled(),
            environment,
            ignore_retry_on_validation: false,
        }
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn Submitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotSink) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn ignore_retry_on_validation(mut self, ignore: bool) -> Self {
        self.ignore_retry_on_validation = ignore;
        self
    }

    pub fn snapshots(&self) -> &SnapshotSink {
        &self.snapshots
    }

    /// Runs one mapped entity through the pipeline
    ///
    /// # Arguments
    ///
    /// * `job` - Processor settings for this record
    /// * `entity` - The fully mapped entity
    /// * `page_body` - Raw page content, snapshotted on validation failure
    ///
    /// # Returns
    ///
    /// * `Ok(outcome)` - The frontier state has been updated accordingly
    /// * `Err(PipelineError)` - A configuration error, or the store failed
    pub async fn complete(
        &self,
        job: &CompletionJob<'_>,
        entity: Entity,
        page_body: &str,
    ) -> Result<CompletionOutcome, PipelineError> {
        let url = entity.url.clone();

        if let Err(e) = validate_required(&entity, job.required_fields) {
            if e.is_configuration() {
                return Err(e);
            }

            let message = e.to_string();
            self.snapshots.write(job.site, &url, &message, page_body).await;

            let terminal = !job.validation_retryable || self.ignore_retry_on_validation;
            if terminal {
                tracing::warn!("{} (terminal)", message);
                self.frontier
                    .mark_max_attempts(job.source, &url, &message)
                    .await?;
            } else {
                tracing::warn!("{} (will retry)", message);
                self.frontier.mark_error(job.source, &url).await?;
            }
            return Ok(CompletionOutcome::ValidationFailed { terminal });
        }

        let inserted = self
            .frontier
            .upsert_entity(job.destination, entity.clone(), job.allow_duplicates)
            .await?;
        tracing::debug!(
            "{} entity for {} in {}",
            if inserted { "Inserted" } else { "Replaced" },
            url,
            job.destination
        );

        if self.environment.is_production() {
            if let Some(submitter) = &self.submitter {
                if let Err(e) = submitter.submit(&entity).await {
                    tracing::warn!("Submission failed for {}: {}", url, e);
                    self.frontier.mark_error(job.source, &url).await?;
                    return Ok(CompletionOutcome::SubmissionFailed);
                }
            }
        }

        if job.skip_completion {
            return Ok(CompletionOutcome::Persisted);
        }

        self.frontier.mark_complete(job.source, &url).await?;
        Ok(CompletionOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::{NewRecord, SqliteFrontier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const URL: &str = "https://x.test/p/1";

    struct CountingSubmitter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Submitter for CountingSubmitter {
        async fn submit(&self, entity: &Entity) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::Submission {
                    url: entity.url.clone(),
                    status: Some(500),
                    message: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    async fn create_test_frontier() -> SharedFrontier {
        let frontier =
            SharedFrontier::new(SqliteFrontier::new_in_memory(3).unwrap(), Duration::from_secs(5));
        frontier.register_root_collection("products").await.unwrap();
        frontier
            .enqueue("products", vec![NewRecord::new(URL)], None)
            .await
            .unwrap();
        frontier
    }

    fn required() -> Vec<String> {
        vec!["ProductName".to_string()]
    }

    fn create_test_job(required: &[String]) -> CompletionJob<'_> {
        CompletionJob {
            site: "acme",
            source: "products",
            destination: "entities",
            required_fields: required,
            validation_retryable: true,
            skip_completion: false,
            allow_duplicates: false,
        }
    }

    fn named_entity() -> Entity {
        let mut entity = Entity::new(URL);
        entity.product_name = "Widget".to_string();
        entity
    }

    #[tokio::test]
    async fn test_empty_required_field_marks_error_without_upsert() {
        let frontier = create_test_frontier().await;
        let pipeline = CompletionPipeline::new(frontier.clone(), Environment::Development);
        let required = required();

        let outcome = pipeline
            .complete(&create_test_job(&required), Entity::new(URL), "<html/>")
            .await
            .unwrap();

        assert_eq!(outcome, CompletionOutcome::ValidationFailed { terminal: false });
        let record = frontier.get_record("products", URL).await.unwrap().unwrap();
        assert!(!record.status);
        assert!(record.error);
        assert_eq!(record.attempts, 1);
        assert_eq!(frontier.count_entities("entities").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ignore_retry_makes_validation_terminal() {
        let frontier = create_test_frontier().await;
        let pipeline = CompletionPipeline::new(frontier.clone(), Environment::Development)
            .ignore_retry_on_validation(true);
        let required = required();

        let outcome = pipeline
            .complete(&create_test_job(&required), Entity::new(URL), "")
            .await
            .unwrap();

        assert_eq!(outcome, CompletionOutcome::ValidationFailed { terminal: true });
        let record = frontier.get_record("products", URL).await.unwrap().unwrap();
        assert_eq!(record.attempts, 3);
        assert!(record.terminal_reason().is_some());
    }

    #[tokio::test]
    async fn test_unknown_required_field_is_an_error() {
        let frontier = create_test_frontier().await;
        let pipeline = CompletionPipeline::new(frontier.clone(), Environment::Development);
        let required = vec!["Colour".to_string()];

        let err = pipeline
            .complete(&create_test_job(&required), named_entity(), "")
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        let record = frontier.get_record("products", URL).await.unwrap().unwrap();
        assert_eq!(record.attempts, 0);
    }

    #[tokio::test]
    async fn test_success_persists_and_completes() {
        let frontier = create_test_frontier().await;
        let pipeline = CompletionPipeline::new(frontier.clone(), Environment::Development);
        let required = required();

        let outcome = pipeline
            .complete(&create_test_job(&required), named_entity(), "")
            .await
            .unwrap();

        assert_eq!(outcome, CompletionOutcome::Completed);
        assert!(frontier.get_record("products", URL).await.unwrap().unwrap().status);
        assert_eq!(frontier.count_entities("entities").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_skip_completion_leaves_record_pending() {
        let frontier = create_test_frontier().await;
        let pipeline = CompletionPipeline::new(frontier.clone(), Environment::Development);
        let required = required();
        let mut job = create_test_job(&required);
        job.skip_completion = true;

        let outcome = pipeline.complete(&job, named_entity(), "").await.unwrap();

        assert_eq!(outcome, CompletionOutcome::Persisted);
        assert!(!frontier.get_record("products", URL).await.unwrap().unwrap().status);
        assert_eq!(frontier.count_entities("entities").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submission_skipped_outside_production() {
        let frontier = create_test_frontier().await;
        let submitter = Arc::new(CountingSubmitter {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let pipeline = CompletionPipeline::new(frontier, Environment::Staging)
            .with_submitter(submitter.clone());
        let required = required();

        let outcome = pipeline
            .complete(&create_test_job(&required), named_entity(), "")
            .await
            .unwrap();

        assert_eq!(outcome, CompletionOutcome::Completed);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_keeps_entity_and_marks_error() {
        let frontier = create_test_frontier().await;
        let submitter = Arc::new(CountingSubmitter {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let pipeline = CompletionPipeline::new(frontier.clone(), Environment::Production)
            .with_submitter(submitter.clone());
        let required = required();
        let job = create_test_job(&required);

        let outcome = pipeline.complete(&job, named_entity(), "").await.unwrap();
        assert_eq!(outcome, CompletionOutcome::SubmissionFailed);

        // The retry replaces the stored entity instead of duplicating it
        pipeline.complete(&job, named_entity(), "").await.unwrap();

        assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(frontier.count_entities("entities").await.unwrap(), 1);
        let record = frontier.get_record("products", URL).await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert!(!record.status);
    }
}
