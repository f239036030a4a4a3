//! Shared fixtures: an in-memory frontier and a scripted navigation backend

use async_trait::async_trait;
use harvester::config::{parse_config, Config};
use harvester::extract::Entity;
use harvester::frontier::{
    CollectionCounts, EnqueueOutcome, FrontierResult, FrontierStore, NewRecord, SharedFrontier,
    SqliteFrontier, UrlRecord,
};
use harvester::navigation::{
    NavigationBackend, NavigationError, NavigationOptions, PageDocument, PageResult,
};
use harvester::ProxyDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Scripted {
    Html(String),
    NotFound,
    Transient,
    Panic,
}

/// Navigation backend answering from a script and recording every call
pub struct FakeBackend {
    script: Mutex<HashMap<String, Scripted>>,
    fallback: Option<Scripted>,
    delay: Duration,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            fallback: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer for every url without a scripted response
    pub fn fallback(mut self, response: Scripted) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on(self, url: &str, response: Scripted) -> Self {
        self.set(url, response);
        self
    }

    pub fn set(&self, url: &str, response: Scripted) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|(url, _)| url).collect()
    }
}

#[async_trait]
impl NavigationBackend for FakeBackend {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyDescriptor>,
        _options: &NavigationOptions,
    ) -> Result<PageResult, NavigationError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), proxy.map(|p| p.server.clone())));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .or_else(|| self.fallback.clone())
            .unwrap_or(Scripted::NotFound);

        match scripted {
            Scripted::Html(html) => Ok(PageResult::Document(PageDocument {
                url: url.to_string(),
                final_url: url.to_string(),
                status: 200,
                html,
            })),
            Scripted::NotFound => Err(NavigationError::NotFound {
                url: url.to_string(),
                status: 404,
                body: Some("<html>gone</html>".to_string()),
            }),
            Scripted::Transient => Err(NavigationError::Transient {
                url: url.to_string(),
                message: "connection reset".to_string(),
            }),
            Scripted::Panic => panic!("scripted panic for {}", url),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Parses a minimal configuration plus extra TOML
///
/// `engine` is inserted into the `[engine]` table; `extra` is appended.
pub fn create_test_config(engine: &str, extra: &str) -> Config {
    parse_config(&format!(
        r#"
[engine]
{}

[output]
database-path = "unused.db"

{}
"#,
        engine, extra
    ))
    .unwrap()
}

pub fn create_test_frontier(max_attempts: u32) -> SharedFrontier {
    SharedFrontier::new(
        SqliteFrontier::new_in_memory(max_attempts).unwrap(),
        Duration::from_secs(5),
    )
}

/// Registers `collection` as a root and fills it with `urls`
pub async fn seed(frontier: &SharedFrontier, collection: &str, urls: &[String]) {
    frontier.register_root_collection(collection).await.unwrap();
    let records = urls.iter().map(|u| NewRecord::new(u.as_str())).collect();
    frontier.enqueue(collection, records, None).await.unwrap();
}

/// SQLite store that records batch limits and can stall batch queries
pub struct RecordingStore {
    inner: SqliteFrontier,
    limits: Arc<Mutex<Vec<usize>>>,
    stall: Duration,
}

impl RecordingStore {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            inner: SqliteFrontier::new_in_memory(max_attempts).unwrap(),
            limits: Arc::new(Mutex::new(Vec::new())),
            stall: Duration::ZERO,
        }
    }

    /// Every batch query sleeps this long before answering
    pub fn stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    /// Handle to the limits passed to batch queries, in call order
    pub fn limits(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.limits)
    }
}

impl FrontierStore for RecordingStore {
    fn register_root_collection(&mut self, collection: &str) -> FrontierResult<()> {
        self.inner.register_root_collection(collection)
    }

    fn is_root_collection(&self, collection: &str) -> FrontierResult<bool> {
        self.inner.is_root_collection(collection)
    }

    fn list_collections(&self) -> FrontierResult<Vec<String>> {
        self.inner.list_collections()
    }

    fn enqueue(
        &mut self,
        collection: &str,
        records: &[NewRecord],
        parent: Option<&str>,
    ) -> FrontierResult<EnqueueOutcome> {
        self.inner.enqueue(collection, records, parent)
    }

    fn next_batch_after(
        &self,
        collection: &str,
        after_id: i64,
        limit: usize,
    ) -> FrontierResult<Vec<UrlRecord>> {
        self.limits.lock().unwrap().push(limit);
        if !self.stall.is_zero() {
            std::thread::sleep(self.stall);
        }
        self.inner.next_batch_after(collection, after_id, limit)
    }

    fn get_record(&self, collection: &str, url: &str) -> FrontierResult<Option<UrlRecord>> {
        self.inner.get_record(collection, url)
    }

    fn mark_complete(&mut self, collection: &str, url: &str) -> FrontierResult<()> {
        self.inner.mark_complete(collection, url)
    }

    fn mark_error(&mut self, collection: &str, url: &str) -> FrontierResult<u32> {
        self.inner.mark_error(collection, url)
    }

    fn mark_max_attempts(&mut self, collection: &str, url: &str, reason: &str) -> FrontierResult<()> {
        self.inner.mark_max_attempts(collection, url, reason)
    }

    fn sync_current_page(&mut self, collection: &str, url: &str, page_url: &str) -> FrontierResult<()> {
        self.inner.sync_current_page(collection, url, page_url)
    }

    fn clear_current_page(&mut self, collection: &str, url: &str) -> FrontierResult<()> {
        self.inner.clear_current_page(collection, url)
    }

    fn max_attempts(&self) -> u32 {
        self.inner.max_attempts()
    }

    fn upsert_entity(
        &mut self,
        collection: &str,
        entity: &Entity,
        allow_duplicates: bool,
    ) -> FrontierResult<bool> {
        self.inner.upsert_entity(collection, entity, allow_duplicates)
    }

    fn count_entities(&self, collection: &str) -> FrontierResult<u64> {
        self.inner.count_entities(collection)
    }

    fn entities_page(&self, collection: &str, offset: u64, limit: usize) -> FrontierResult<Vec<Entity>> {
        self.inner.entities_page(collection, offset, limit)
    }

    fn count_by_state(&self, collection: &str) -> FrontierResult<CollectionCounts> {
        self.inner.count_by_state(collection)
    }
}
