//! Async access to a shared frontier store
//!
//! Every call runs the synchronous store on the blocking pool under an
//! independent deadline, so one stuck write cannot stall the worker pool.

use crate::extract::Entity;
use crate::frontier::stats::{load_statistics, FrontierStatistics};
use crate::frontier::traits::{FrontierError, FrontierResult, FrontierStore};
use crate::frontier::{EnqueueOutcome, NewRecord, UrlRecord};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Cloneable handle to a frontier store
#[derive(Clone)]
pub struct SharedFrontier {
    store: Arc<Mutex<dyn FrontierStore>>,
    timeout: Duration,
    max_attempts: u32,
}

impl SharedFrontier {
    /// Wraps a store
    ///
    /// # Arguments
    ///
    /// * `store` - Any frontier backend
    /// * `timeout` - Deadline applied to each store call
    pub fn new<S: FrontierStore + 'static>(store: S, timeout: Duration) -> Self {
        let max_attempts = store.max_attempts();
        Self {
            store: Arc::new(Mutex::new(store)),
            timeout,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Locks the store for synchronous use outside the worker pool
    pub fn lock(&self) -> FrontierResult<MutexGuard<'_, dyn FrontierStore + 'static>> {
        self.store.lock().map_err(|_| FrontierError::Lock)
    }

    async fn call<T, F>(&self, op: &'static str, f: F) -> FrontierResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn FrontierStore) -> FrontierResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| FrontierError::Lock)?;
            f(&mut *guard)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(FrontierError::Join(e.to_string())),
            Err(_) => Err(FrontierError::Timeout {
                op,
                after: self.timeout,
            }),
        }
    }

    pub async fn register_root_collection(&self, collection: &str) -> FrontierResult<()> {
        let collection = collection.to_string();
        self.call("register_root_collection", move |s| {
            s.register_root_collection(&collection)
        })
        .await
    }

    pub async fn enqueue(
        &self,
        collection: &str,
        records: Vec<NewRecord>,
        parent: Option<&str>,
    ) -> FrontierResult<EnqueueOutcome> {
        let collection = collection.to_string();
        let parent = parent.map(str::to_string);
        self.call("enqueue", move |s| {
            s.enqueue(&collection, &records, parent.as_deref())
        })
        .await
    }

    pub async fn next_batch(&self, collection: &str, limit: usize) -> FrontierResult<Vec<UrlRecord>> {
        let collection = collection.to_string();
        self.call("next_batch", move |s| s.next_batch(&collection, limit))
            .await
    }

    /// Eligible records with an id above `after_id`, the cursor of a batch loop
    pub async fn next_batch_after(
        &self,
        collection: &str,
        after_id: i64,
        limit: usize,
    ) -> FrontierResult<Vec<UrlRecord>> {
        let collection = collection.to_string();
        self.call("next_batch_after", move |s| {
            s.next_batch_after(&collection, after_id, limit)
        })
        .await
    }

    pub async fn get_record(&self, collection: &str, url: &str) -> FrontierResult<Option<UrlRecord>> {
        let (collection, url) = (collection.to_string(), url.to_string());
        self.call("get_record", move |s| s.get_record(&collection, &url))
            .await
    }

    pub async fn mark_complete(&self, collection: &str, url: &str) -> FrontierResult<()> {
        let (collection, url) = (collection.to_string(), url.to_string());
        self.call("mark_complete", move |s| s.mark_complete(&collection, &url))
            .await
    }

    pub async fn mark_error(&self, collection: &str, url: &str) -> FrontierResult<u32> {
        let (collection, url) = (collection.to_string(), url.to_string());
        self.call("mark_error", move |s| s.mark_error(&collection, &url))
            .await
    }

    pub async fn mark_max_attempts(
        &self,
        collection: &str,
        url: &str,
        reason: &str,
    ) -> FrontierResult<()> {
        let (collection, url, reason) = (collection.to_string(), url.to_string(), reason.to_string());
        self.call("mark_max_attempts", move |s| {
            s.mark_max_attempts(&collection, &url, &reason)
        })
        .await
    }

    pub async fn sync_current_page(
        &self,
        collection: &str,
        url: &str,
        page_url: &str,
    ) -> FrontierResult<()> {
        let (collection, url, page_url) =
            (collection.to_string(), url.to_string(), page_url.to_string());
        self.call("sync_current_page", move |s| {
            s.sync_current_page(&collection, &url, &page_url)
        })
        .await
    }

    pub async fn clear_current_page(&self, collection: &str, url: &str) -> FrontierResult<()> {
        let (collection, url) = (collection.to_string(), url.to_string());
        self.call("clear_current_page", move |s| {
            s.clear_current_page(&collection, &url)
        })
        .await
    }

    pub async fn upsert_entity(
        &self,
        collection: &str,
        entity: Entity,
        allow_duplicates: bool,
    ) -> FrontierResult<bool> {
        let collection = collection.to_string();
        self.call("upsert_entity", move |s| {
            s.upsert_entity(&collection, &entity, allow_duplicates)
        })
        .await
    }

    pub async fn count_entities(&self, collection: &str) -> FrontierResult<u64> {
        let collection = collection.to_string();
        self.call("count_entities", move |s| s.count_entities(&collection))
            .await
    }

    pub async fn entities_page(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
    ) -> FrontierResult<Vec<Entity>> {
        let collection = collection.to_string();
        self.call("entities_page", move |s| {
            s.entities_page(&collection, offset, limit)
        })
        .await
    }

    pub async fn statistics(&self) -> FrontierResult<FrontierStatistics> {
        self.call("statistics", |s| load_statistics(&*s)).await
    }
}
