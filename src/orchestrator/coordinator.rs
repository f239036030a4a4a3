//! Orchestrator - drains frontier collections in bounded batches
//!
//! For each processor the orchestrator repeatedly:
//! - Fetches the next eligible batch from the source collection
//! - Skips URLs already dispatched during this run
//! - Hands the batch to a pool of workers over a bounded queue
//! - Enqueues discovered child URLs and marks their parents complete
//!
//! The loop ends when the source has no eligible records left, the item
//! cap is reached, the run is cancelled, or a fatal error occurs.

use crate::config::{BackendKind, Config, EngineConfig, NavigationConfig, ProxyConfig};
use crate::frontier::{NewRecord, SharedFrontier, UrlRecord};
use crate::navigation::{build_backend, NavigationBackend, NavigationOptions};
use crate::orchestrator::context::RunContext;
use crate::orchestrator::metrics::RequestMetrics;
use crate::orchestrator::processor::ProcessorConfig;
use crate::orchestrator::worker::{run_worker, WorkerReport, WorkerShared};
use crate::pipeline::{CompletionPipeline, HttpSubmitter, SnapshotSink};
use crate::proxy::ProxyAllocator;
use crate::site::SiteDefinition;
use crate::{ConfigError, HarvestError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of one processor run
#[derive(Debug, Clone, Default)]
pub struct ProcessorSummary {
    pub name: String,
    pub batches: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    /// New child URLs written to the destination collection
    pub discovered: usize,
    /// Child URLs that were already known
    pub duplicates: usize,
    /// Set when the loop stopped on a non-fatal store failure
    pub aborted: Option<String>,
}

impl ProcessorSummary {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn absorb(&mut self, report: &WorkerReport) {
        self.batches += 1;
        self.processed += report.processed;
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.panicked += report.panicked;
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processors: Vec<ProcessorSummary>,
    pub cap_reached: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.processors.iter().map(|p| p.processed).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.processors.iter().map(|p| p.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.processors.iter().map(|p| p.failed).sum()
    }

    pub fn discovered(&self) -> usize {
        self.processors.iter().map(|p| p.discovered).sum()
    }

    fn merge(&mut self, other: RunSummary) {
        self.processors.extend(other.processors);
        self.cap_reached |= other.cap_reached;
        self.cancelled |= other.cancelled;
        self.elapsed += other.elapsed;
    }
}

/// Drives processors against the frontier
pub struct Orchestrator {
    engine: EngineConfig,
    proxy: ProxyConfig,
    navigation: NavigationConfig,
    frontier: SharedFrontier,
    pipeline: CompletionPipeline,
    run: Arc<RunContext>,
    backends: Mutex<HashMap<BackendKind, Arc<dyn NavigationBackend>>>,
}

impl Orchestrator {
    /// Creates an orchestrator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `frontier` - Shared handle to the frontier store
    ///
    /// # Returns
    ///
    /// * `Err(HarvestError)` - The submission client could not be built
    pub fn new(config: &Config, frontier: SharedFrontier) -> Result<Self, HarvestError> {
        let mut pipeline = CompletionPipeline::new(frontier.clone(), config.engine.environment)
            .with_snapshots(SnapshotSink::from_option(config.output.snapshot_dir.as_deref()))
            .ignore_retry_on_validation(config.engine.ignore_retry_on_validation);

        if let Some(submission) = &config.submission {
            pipeline = pipeline.with_submitter(Arc::new(HttpSubmitter::new(submission)?));
        }

        let run = RunContext::new(
            Arc::new(RequestMetrics::new()),
            CancellationToken::new(),
            config.rate_limit.clone(),
            config.engine.effective_item_cap(),
        );

        Ok(Self {
            engine: config.engine.clone(),
            proxy: config.proxy.clone(),
            navigation: config.navigation.clone(),
            frontier,
            pipeline,
            run: Arc::new(run),
            backends: Mutex::new(HashMap::new()),
        })
    }

    /// Installs a backend for `kind` instead of building it on first use
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn NavigationBackend>) -> Self {
        self.backends.get_mut().insert(kind, backend);
        self
    }

    /// Token that stops dispatch when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.run.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        Arc::clone(&self.run.metrics)
    }

    pub fn frontier(&self) -> &SharedFrontier {
        &self.frontier
    }

    /// Items claimed so far against the run cap
    pub fn items_processed(&self) -> usize {
        self.run.claimed()
    }

    async fn backend(&self, kind: BackendKind) -> Result<Arc<dyn NavigationBackend>, ConfigError> {
        let mut backends = self.backends.lock().await;
        if let Some(backend) = backends.get(&kind) {
            return Ok(Arc::clone(backend));
        }
        let backend = build_backend(kind, &self.navigation)?;
        backends.insert(kind, Arc::clone(&backend));
        Ok(backend)
    }

    /// Seeds a site's root collection and runs its processors in order
    pub async fn run_site(&self, site: &SiteDefinition) -> Result<RunSummary, HarvestError> {
        tracing::info!("Starting site {}", site.name);

        self.frontier
            .register_root_collection(&site.root_collection)
            .await?;
        let seeds = site.seeds.iter().map(|s| NewRecord::new(s.as_str())).collect();
        let seeded = self
            .frontier
            .enqueue(&site.root_collection, seeds, None)
            .await?;
        tracing::info!(
            "Seeded {}: {} new, {} already known",
            site.root_collection,
            seeded.inserted,
            seeded.duplicates
        );

        let mut summary = RunSummary::default();
        for processor in &site.processors {
            if self.run.is_cancelled() {
                break;
            }
            summary.merge(self.run_processor(Arc::clone(processor)).await?);
        }

        tracing::info!(
            "Finished site {}: {} processed, {} succeeded, {} failed",
            site.name,
            summary.processed(),
            summary.succeeded(),
            summary.failed()
        );
        Ok(summary)
    }

    /// Drains one processor's source collection
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The source is drained, capped or cancelled
    /// * `Err(HarvestError)` - A fatal configuration error halted the run
    pub async fn run_processor(&self, processor: Arc<ProcessorConfig>) -> Result<RunSummary, HarvestError> {
        let start = Instant::now();
        processor.validate()?;

        let strategy = processor.proxy_strategy.unwrap_or(self.proxy.strategy);
        let proxies = ProxyAllocator::new(
            strategy,
            self.proxy.servers.clone(),
            Duration::from_millis(self.proxy.rotation_cooldown_ms),
        )?;

        let kind = processor.backend.unwrap_or(self.navigation.backend);
        let backend = self.backend(kind).await?;

        let mut options = NavigationOptions::from_config(&self.navigation);
        if let Some(timeout) = processor.timeout {
            options = options.with_timeout(timeout);
        }

        let concurrency = processor
            .concurrency_limit
            .unwrap_or(self.engine.concurrency_limit)
            .max(1);

        tracing::info!(
            "Running processor {} ({} -> {}) on {} backend, proxy strategy {}, concurrency {}",
            processor.name,
            processor.source,
            processor.destination,
            backend.name(),
            strategy,
            concurrency
        );

        let shared = Arc::new(WorkerShared {
            processor: Arc::clone(&processor),
            frontier: self.frontier.clone(),
            backend,
            options,
            proxies: Arc::new(proxies),
            run: Arc::clone(&self.run),
            pipeline: self.pipeline.clone(),
        });

        let mut summary = ProcessorSummary::new(&processor.name);
        let mut dispatched: HashSet<String> = HashSet::new();
        // Records at or below this id were already offered during this run
        let mut cursor = 0i64;

        loop {
            if self.run.is_cancelled() {
                break;
            }

            let records = match self
                .frontier
                .next_batch_after(&processor.source, cursor, self.engine.batch_size)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!("Could not load batch from {}: {}", processor.source, e);
                    summary.aborted = Some(e.to_string());
                    break;
                }
            };

            let Some(last) = records.last() else {
                tracing::info!("No eligible records left in {}", processor.source);
                break;
            };
            cursor = last.id;

            let batch: Vec<UrlRecord> = records
                .into_iter()
                .filter(|r| !dispatched.contains(&r.url))
                .collect();
            if batch.is_empty() {
                continue;
            }

            dispatched.extend(batch.iter().map(|r| r.url.clone()));
            shared.proxies.begin_batch();

            tracing::info!(
                "[{}] batch {}: {} records",
                processor.name,
                summary.batches + 1,
                batch.len()
            );

            let mut report = self.dispatch_batch(&shared, batch, concurrency).await;
            summary.absorb(&report);

            if let Err(e) = self
                .record_discoveries(&processor, std::mem::take(&mut report.discovered), &mut summary)
                .await
            {
                tracing::error!("Could not store discovered links: {}", e);
                summary.aborted = Some(e.to_string());
                break;
            }

            tracing::info!("[{}] metrics: {}", processor.name, self.run.metrics.snapshot());

            if let Some(fatal) = report.fatal {
                return Err(fatal);
            }
            if self.run.cap_reached() {
                break;
            }
        }

        tracing::info!(
            "Processor {} done: {} processed, {} succeeded, {} failed, {} new links",
            summary.name,
            summary.processed,
            summary.succeeded,
            summary.failed,
            summary.discovered
        );

        Ok(RunSummary {
            processors: vec![summary],
            cap_reached: self.run.cap_reached(),
            cancelled: self.run.is_cancelled(),
            elapsed: start.elapsed(),
        })
    }

    /// Runs one batch through the worker pool and waits for it
    async fn dispatch_batch(
        &self,
        shared: &Arc<WorkerShared>,
        batch: Vec<UrlRecord>,
        concurrency: usize,
    ) -> WorkerReport {
        let pool = shared.proxies.pool_size().max(1);
        let workers = (pool * concurrency).min(batch.len());

        let (tx, rx) = mpsc::channel(batch.len().max(1));
        for record in batch {
            if tx.send(record).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let mut set = JoinSet::new();
        for slot in 0..workers {
            set.spawn(run_worker(slot, Arc::clone(shared), Arc::clone(&queue)));
        }

        let mut report = WorkerReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(worker) => report.merge(worker),
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }
        report
    }

    /// Bulk-enqueues child URLs and completes the parents that finished
    async fn record_discoveries(
        &self,
        processor: &ProcessorConfig,
        discovered: Vec<crate::orchestrator::worker::Discovered>,
        summary: &mut ProcessorSummary,
    ) -> Result<(), HarvestError> {
        for found in discovered {
            if !found.children.is_empty() {
                let records = found.children.into_iter().map(NewRecord::from).collect();
                let outcome = self
                    .frontier
                    .enqueue(&processor.destination, records, Some(&found.parent))
                    .await?;
                summary.discovered += outcome.inserted;
                summary.duplicates += outcome.duplicates;
            }

            if found.complete && !processor.skip_completion {
                self.frontier
                    .mark_complete(&processor.source, &found.parent)
                    .await?;
            }
        }
        Ok(())
    }

    /// Releases browsers and other backend resources
    pub async fn shutdown(&self) {
        let backends: Vec<_> = self.backends.lock().await.values().cloned().collect();
        for backend in backends {
            backend.shutdown().await;
        }
    }
}
