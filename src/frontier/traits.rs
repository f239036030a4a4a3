//! Frontier store trait and error types

use crate::extract::Entity;
use crate::frontier::{EnqueueOutcome, NewRecord, UrlRecord};
use crate::frontier::stats::CollectionCounts;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during frontier operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {url} in {collection}")]
    NotFound { collection: String, url: String },

    #[error("Record {url} in non-root collection {collection} has no parent")]
    MissingParent { collection: String, url: String },

    #[error("Store operation '{op}' timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Frontier lock poisoned")]
    Lock,

    #[error("Store task failed: {0}")]
    Join(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;

/// Trait for frontier backends
///
/// Every mutation is keyed by `(collection, url)`. Implementations are driven
/// from blocking tasks through [`crate::frontier::SharedFrontier`].
pub trait FrontierStore: Send {
    // ===== Collections =====

    /// Registers a collection whose records may be inserted without a parent
    fn register_root_collection(&mut self, collection: &str) -> FrontierResult<()>;

    /// Returns true if the collection was registered as a root
    fn is_root_collection(&self, collection: &str) -> FrontierResult<bool>;

    /// Lists every collection holding records or entities
    fn list_collections(&self) -> FrontierResult<Vec<String>>;

    // ===== Frontier records =====

    /// Bulk-inserts records
    ///
    /// Records whose url already exists in the collection are counted as
    /// duplicates and skipped; they never abort their siblings.
    ///
    /// # Arguments
    ///
    /// * `collection` - Destination collection
    /// * `records` - Records to insert
    /// * `parent` - URL of the page that produced the records; required unless
    ///   `collection` is a root collection
    fn enqueue(
        &mut self,
        collection: &str,
        records: &[NewRecord],
        parent: Option<&str>,
    ) -> FrontierResult<EnqueueOutcome>;

    /// Returns up to `limit` records with `status=false AND attempts<max`,
    /// oldest first
    fn next_batch(&self, collection: &str, limit: usize) -> FrontierResult<Vec<UrlRecord>> {
        self.next_batch_after(collection, 0, limit)
    }

    /// Like [`FrontierStore::next_batch`], restricted to records with an id
    /// above `after_id`
    fn next_batch_after(
        &self,
        collection: &str,
        after_id: i64,
        limit: usize,
    ) -> FrontierResult<Vec<UrlRecord>>;

    /// Gets a record by key
    fn get_record(&self, collection: &str, url: &str) -> FrontierResult<Option<UrlRecord>>;

    /// Sets `status=true`
    fn mark_complete(&mut self, collection: &str, url: &str) -> FrontierResult<()>;

    /// Increments attempts by one and sets `error=true`
    ///
    /// # Returns
    ///
    /// The new attempt count
    fn mark_error(&mut self, collection: &str, url: &str) -> FrontierResult<u32>;

    /// Forces the record out of batch eligibility
    ///
    /// Sets attempts to at least the retry ceiling, sets `error=true`, and
    /// stores `reason` under the `terminal_reason` metadata key.
    fn mark_max_attempts(&mut self, collection: &str, url: &str, reason: &str)
        -> FrontierResult<()>;

    /// Records a sub-page resume point without completing the record
    fn sync_current_page(&mut self, collection: &str, url: &str, page_url: &str)
        -> FrontierResult<()>;

    /// Drops the resume point once every sub-page has been read
    fn clear_current_page(&mut self, collection: &str, url: &str) -> FrontierResult<()>;

    /// Retry ceiling used by batch selection
    fn max_attempts(&self) -> u32;

    // ===== Entities =====

    /// Persists an entity
    ///
    /// Replaces any entity with the same url unless `allow_duplicates` is set.
    ///
    /// # Returns
    ///
    /// True if a new row was inserted, false if an existing row was replaced
    fn upsert_entity(
        &mut self,
        collection: &str,
        entity: &Entity,
        allow_duplicates: bool,
    ) -> FrontierResult<bool>;

    /// Counts entities in a collection
    fn count_entities(&self, collection: &str) -> FrontierResult<u64>;

    /// Returns one page of entities ordered by url
    fn entities_page(&self, collection: &str, offset: u64, limit: usize)
        -> FrontierResult<Vec<Entity>>;

    // ===== Statistics =====

    /// Counts records per derived state
    fn count_by_state(&self, collection: &str) -> FrontierResult<CollectionCounts>;
}
