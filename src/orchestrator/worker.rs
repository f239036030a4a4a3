//! Per-URL worker tasks
//!
//! Workers pull records from a shared handoff queue until it is drained or
//! the run is cancelled. Each record is fetched, mapped and completed
//! inside a panic boundary so one bad page never takes the pool down.

use crate::extract::{
    discover_links, map_entity, next_page_link, DiscoveryRule, Entity, ExtractError, FetchContext,
    Schema,
};
use crate::frontier::{SharedFrontier, UrlRecord};
use crate::navigation::{NavigationBackend, NavigationError, NavigationOptions, PageResult};
use crate::orchestrator::context::RunContext;
use crate::orchestrator::processor::{ProcessorConfig, ProcessorMode};
use crate::pipeline::{CompletionJob, CompletionPipeline};
use crate::proxy::{ProxyAllocator, ProxyLease, ProxyStrategy};
use crate::HarvestError;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use url::Url;

/// Handoff queue shared by the workers of one batch
pub(crate) type RecordQueue = Arc<Mutex<mpsc::Receiver<UrlRecord>>>;

/// Everything a worker needs for one processor run
pub(crate) struct WorkerShared {
    pub processor: Arc<ProcessorConfig>,
    pub frontier: SharedFrontier,
    pub backend: Arc<dyn NavigationBackend>,
    pub options: NavigationOptions,
    pub proxies: Arc<ProxyAllocator>,
    pub run: Arc<RunContext>,
    pub pipeline: CompletionPipeline,
}

/// Child URLs a discovery record yielded
#[derive(Debug)]
pub(crate) struct Discovered {
    pub parent: String,
    pub children: Vec<String>,
    /// False when pagination stopped on a failure; the parent stays pending
    pub complete: bool,
}

/// Counts reported by one worker
#[derive(Debug, Default)]
pub(crate) struct WorkerReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    pub discovered: Vec<Discovered>,
    pub fatal: Option<HarvestError>,
}

impl WorkerReport {
    pub fn merge(&mut self, other: WorkerReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.panicked += other.panicked;
        self.discovered.extend(other.discovered);
        if self.fatal.is_none() {
            self.fatal = other.fatal;
        }
    }
}

enum RecordOutcome {
    Succeeded,
    Failed,
    Discovered(Discovered),
}

/// Drains the queue, one record at a time
///
/// `slot` is the worker's index within the batch, used for static proxy
/// assignment.
pub(crate) async fn run_worker(slot: usize, shared: Arc<WorkerShared>, queue: RecordQueue) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        if shared.run.is_cancelled() {
            break;
        }

        let record = queue.lock().await.recv().await;
        let Some(record) = record else {
            break;
        };

        if !shared.run.claim_item() {
            break;
        }
        report.processed += 1;
        shared.run.pace().await;

        // Rotation strategies share one current proxy; pick it up per record
        let mut lease = shared.proxies.assign(slot);
        tracing::debug!("[{}] worker {} processing {}", shared.processor.name, slot, record.url);

        let outcome = AssertUnwindSafe(process_record(&shared, &record, &mut lease))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(RecordOutcome::Succeeded)) => report.succeeded += 1,
            Ok(Ok(RecordOutcome::Failed)) => report.failed += 1,
            Ok(Ok(RecordOutcome::Discovered(found))) => {
                if found.complete {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
                report.discovered.push(found);
            }
            Ok(Err(e)) if e.is_fatal() => {
                tracing::error!("[{}] fatal error on {}: {}", shared.processor.name, record.url, e);
                report.failed += 1;
                report.fatal = Some(e);
                shared.run.cancel.cancel();
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!("[{}] failed {}: {}", shared.processor.name, record.url, e);
                report.failed += 1;
                mark_error_quietly(&shared, &record.url).await;
            }
            Err(payload) => {
                tracing::error!(
                    "[{}] worker {} panicked on {}: {}",
                    shared.processor.name,
                    slot,
                    record.url,
                    panic_message(payload.as_ref())
                );
                report.panicked += 1;
                report.failed += 1;
                mark_error_quietly(&shared, &record.url).await;
            }
        }
    }

    report
}

async fn mark_error_quietly(shared: &WorkerShared, url: &str) {
    if let Err(e) = shared.frontier.mark_error(&shared.processor.source, url).await {
        tracing::error!("Could not mark {} as failed: {}", url, e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn process_record(
    shared: &WorkerShared,
    record: &UrlRecord,
    lease: &mut Option<ProxyLease>,
) -> Result<RecordOutcome, HarvestError> {
    match &shared.processor.mode {
        ProcessorMode::Discovery {
            rule,
            next_page,
            max_pages,
        } => discover(shared, record, rule, next_page.as_deref(), *max_pages, lease).await,
        ProcessorMode::Detail {
            schema,
            required_fields,
            validation_retryable,
        } => {
            let Some(page) = fetch_page(shared, record, &record.url, lease).await? else {
                return Ok(RecordOutcome::Failed);
            };
            detail(shared, record, &page, schema, required_fields, *validation_retryable).await
        }
    }
}

/// Fetches `target` on behalf of `record`, handling classified failures
///
/// # Returns
///
/// * `Ok(Some(page))` - The page was fetched
/// * `Ok(None)` - The fetch failed and the record has been marked accordingly
/// * `Err(HarvestError)` - The frontier could not be updated
async fn fetch_page(
    shared: &WorkerShared,
    record: &UrlRecord,
    target: &str,
    lease: &mut Option<ProxyLease>,
) -> Result<Option<PageResult>, HarvestError> {
    let source = shared.processor.source.as_str();
    let timeout = shared.options.timeout;

    loop {
        let proxy = lease.as_ref().map(|l| &l.proxy);
        shared.run.metrics.record_request();

        let fetched = tokio::time::timeout(timeout, shared.backend.fetch(target, proxy, &shared.options))
            .await
            .unwrap_or_else(|_| {
                Err(NavigationError::Timeout {
                    url: target.to_string(),
                    after: timeout,
                })
            });

        let err = match fetched {
            Ok(page) => return Ok(Some(page)),
            Err(e) => e,
        };
        shared.run.metrics.record_failure();

        if let Some(body) = err.captured_body() {
            shared
                .pipeline
                .snapshots()
                .write(&shared.processor.site, target, &err.to_string(), body)
                .await;
        }

        if err.is_not_found() {
            tracing::info!("{}", err);
            shared
                .frontier
                .mark_max_attempts(source, &record.url, &err.to_string())
                .await?;
            return Ok(None);
        }

        let attempts = shared.frontier.mark_error(source, &record.url).await?;

        if !err.is_retryable() {
            tracing::warn!("{} (not retryable)", err);
            return Ok(None);
        }
        tracing::warn!("{} (attempt {}/{})", err, attempts, shared.frontier.max_attempts());

        let rotating = shared.proxies.strategy() == ProxyStrategy::Rotation;
        let current = match lease.as_ref() {
            Some(current) if rotating && attempts < shared.frontier.max_attempts() => current,
            _ => return Ok(None),
        };

        let next = shared.proxies.rotate_after_failure(current);
        let cooldown = shared.proxies.cooldown();
        if !cooldown.is_zero() {
            tokio::time::sleep(cooldown).await;
        }
        *lease = Some(next);

        if shared.run.is_cancelled() {
            return Ok(None);
        }
    }
}

async fn detail(
    shared: &WorkerShared,
    record: &UrlRecord,
    page: &PageResult,
    schema: &Schema,
    required_fields: &[String],
    validation_retryable: bool,
) -> Result<RecordOutcome, HarvestError> {
    let (entity, reported) = map_page(schema, record, page)?;

    if let Some(page_url) = reported {
        shared
            .frontier
            .sync_current_page(&shared.processor.source, &record.url, &page_url)
            .await?;
    }

    let processor = &shared.processor;
    let job = CompletionJob {
        site: &processor.site,
        source: &processor.source,
        destination: &processor.destination,
        required_fields,
        validation_retryable,
        skip_completion: processor.skip_completion,
        allow_duplicates: processor.allow_duplicates,
    };

    let outcome = shared.pipeline.complete(&job, entity, page.body()).await?;
    Ok(if outcome.is_success() {
        RecordOutcome::Succeeded
    } else {
        RecordOutcome::Failed
    })
}

/// Maps one page; the parsed document never crosses an await point
fn map_page(
    schema: &Schema,
    record: &UrlRecord,
    page: &PageResult,
) -> Result<(Entity, Option<String>), ExtractError> {
    let document = page.as_document().map(|d| d.parse());
    let ctx = FetchContext::new(record, page, document.as_ref());
    let entity = map_entity(schema, &ctx)?;
    Ok((entity, ctx.take_reported_page()))
}

struct ListingScan {
    links: Vec<String>,
    next: Option<String>,
    reported: Option<String>,
}

fn scan_listing(
    rule: &DiscoveryRule,
    next_page: Option<&str>,
    record: &UrlRecord,
    page: &PageResult,
) -> Result<ListingScan, ExtractError> {
    let document = page.as_document().map(|d| d.parse());
    let ctx = FetchContext::new(record, page, document.as_ref());
    let links = discover_links(rule, &ctx)?;

    let next = match (next_page, document.as_ref(), Url::parse(page.final_url())) {
        (Some(query), Some(doc), Ok(base)) => next_page_link(doc, query, &base)?,
        _ => None,
    };

    Ok(ListingScan {
        links,
        next,
        reported: ctx.take_reported_page(),
    })
}

/// Collects child URLs, following "next page" links when configured
///
/// Each followed sub-page is stored as the record's resume point, so a
/// retry starts where the previous attempt stopped. The point is cleared
/// once the last page has been read.
async fn discover(
    shared: &WorkerShared,
    record: &UrlRecord,
    rule: &DiscoveryRule,
    next_page: Option<&str>,
    max_pages: usize,
    lease: &mut Option<ProxyLease>,
) -> Result<RecordOutcome, HarvestError> {
    let source = shared.processor.source.as_str();
    let mut target = match (next_page, record.current_page_url.as_deref()) {
        (Some(_), Some(resume)) => {
            tracing::debug!("Resuming {} from {}", record.url, resume);
            resume.to_string()
        }
        _ => record.url.clone(),
    };

    let mut found = Discovered {
        parent: record.url.clone(),
        children: Vec::new(),
        complete: false,
    };
    let mut pages = 0;
    let mut resume_stored = record.current_page_url.is_some();

    loop {
        let Some(page) = fetch_page(shared, record, &target, lease).await? else {
            return Ok(RecordOutcome::Discovered(found));
        };
        pages += 1;

        let scan = scan_listing(rule, next_page, record, &page)?;
        for link in scan.links {
            if !found.children.contains(&link) {
                found.children.push(link);
            }
        }

        if let Some(page_url) = scan.reported {
            shared.frontier.sync_current_page(source, &record.url, &page_url).await?;
            resume_stored = true;
        }

        let next = match scan.next {
            Some(next) if next != target => next,
            _ => break,
        };
        if pages >= max_pages {
            tracing::info!("Stopped {} after {} pages", record.url, pages);
            break;
        }
        if shared.run.is_cancelled() {
            return Ok(RecordOutcome::Discovered(found));
        }

        shared.frontier.sync_current_page(source, &record.url, &next).await?;
        resume_stored = true;
        shared.run.pace().await;
        target = next;
    }

    // A finished listing starts from its first page next time
    if resume_stored {
        shared.frontier.clear_current_page(source, &record.url).await?;
    }

    tracing::debug!("{} yielded {} links over {} pages", record.url, found.children.len(), pages);
    found.complete = true;
    Ok(RecordOutcome::Discovered(found))
}
