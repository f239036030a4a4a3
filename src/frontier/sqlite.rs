//! SQLite frontier implementation
//!
//! This module provides a SQLite-based implementation of the FrontierStore trait.

use crate::extract::Entity;
use crate::frontier::record::TERMINAL_REASON_KEY;
use crate::frontier::schema::initialize_schema;
use crate::frontier::stats::CollectionCounts;
use crate::frontier::traits::{FrontierError, FrontierResult, FrontierStore};
use crate::frontier::{EnqueueOutcome, NewRecord, UrlRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const RECORD_COLUMNS: &str = "id, collection, url, parent, status, error, attempts, metadata,
     current_page_url, created_at, updated_at";

/// SQLite frontier backend
pub struct SqliteFrontier {
    conn: Connection,
    max_attempts: u32,
}

impl SqliteFrontier {
    /// Creates a new SqliteFrontier instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `max_attempts` - Retry ceiling applied by batch selection
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteFrontier)` - Successfully opened/created database
    /// * `Err(FrontierError)` - Failed to open database
    pub fn new(path: &Path, max_attempts: u32) -> FrontierResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn, max_attempts })
    }

    /// Creates an in-memory database
    pub fn new_in_memory(max_attempts: u32) -> FrontierResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn, max_attempts })
    }

    fn not_found(collection: &str, url: &str) -> FrontierError {
        FrontierError::NotFound {
            collection: collection.to_string(),
            url: url.to_string(),
        }
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    let metadata_raw: String = row.get(7)?;
    let metadata: BTreeMap<String, Value> =
        serde_json::from_str(&metadata_raw).map_err(|e| conversion_error(7, e))?;

    Ok(UrlRecord {
        id: row.get(0)?,
        collection: row.get(1)?,
        url: row.get(2)?,
        parent: row.get(3)?,
        status: row.get(4)?,
        error: row.get(5)?,
        attempts: row.get(6)?,
        metadata,
        current_page_url: row.get(8)?,
        created_at: parse_timestamp(row, 9)?,
        updated_at: parse_timestamp(row, 10)?,
    })
}

impl FrontierStore for SqliteFrontier {
    // ===== Collections =====

    fn register_root_collection(&mut self, collection: &str) -> FrontierResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO root_collections (name) VALUES (?1)",
            params![collection],
        )?;
        Ok(())
    }

    fn is_root_collection(&self, collection: &str) -> FrontierResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM root_collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_collections(&self) -> FrontierResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT collection FROM url_records UNION SELECT collection FROM entities ORDER BY 1",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    // ===== Frontier records =====

    fn enqueue(
        &mut self,
        collection: &str,
        records: &[NewRecord],
        parent: Option<&str>,
    ) -> FrontierResult<EnqueueOutcome> {
        if records.is_empty() {
            return Ok(EnqueueOutcome::default());
        }

        if parent.is_none() && !self.is_root_collection(collection)? {
            return Err(FrontierError::MissingParent {
                collection: collection.to_string(),
                url: records[0].url.clone(),
            });
        }

        let now = now_string();
        let mut outcome = EnqueueOutcome::default();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO url_records
                 (collection, url, parent, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            )?;

            for record in records {
                let metadata = serde_json::to_string(&record.metadata)?;
                let changed = stmt.execute(params![collection, record.url, parent, metadata, now])?;
                if changed == 0 {
                    outcome.duplicates += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;

        Ok(outcome)
    }

    fn next_batch_after(
        &self,
        collection: &str,
        after_id: i64,
        limit: usize,
    ) -> FrontierResult<Vec<UrlRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM url_records
             WHERE collection = ?1 AND status = 0 AND attempts < ?2 AND id > ?3
             ORDER BY id LIMIT ?4",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(
                params![collection, self.max_attempts, after_id, limit as i64],
                row_to_record,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn get_record(&self, collection: &str, url: &str) -> FrontierResult<Option<UrlRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM url_records WHERE collection = ?1 AND url = ?2",
                    RECORD_COLUMNS
                ),
                params![collection, url],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn mark_complete(&mut self, collection: &str, url: &str) -> FrontierResult<()> {
        let changed = self.conn.execute(
            "UPDATE url_records SET status = 1, updated_at = ?1 WHERE collection = ?2 AND url = ?3",
            params![now_string(), collection, url],
        )?;
        if changed == 0 {
            return Err(Self::not_found(collection, url));
        }
        Ok(())
    }

    fn mark_error(&mut self, collection: &str, url: &str) -> FrontierResult<u32> {
        let tx = self.conn.transaction()?;

        let current: u32 = tx
            .query_row(
                "SELECT attempts FROM url_records WHERE collection = ?1 AND url = ?2",
                params![collection, url],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Self::not_found(collection, url))?;

        let attempts = current.saturating_add(1);
        tx.execute(
            "UPDATE url_records SET attempts = ?1, error = 1, updated_at = ?2
             WHERE collection = ?3 AND url = ?4",
            params![attempts, now_string(), collection, url],
        )?;
        tx.commit()?;

        Ok(attempts)
    }

    fn mark_max_attempts(
        &mut self,
        collection: &str,
        url: &str,
        reason: &str,
    ) -> FrontierResult<()> {
        let tx = self.conn.transaction()?;

        let raw: String = tx
            .query_row(
                "SELECT metadata FROM url_records WHERE collection = ?1 AND url = ?2",
                params![collection, url],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Self::not_found(collection, url))?;

        let mut metadata: BTreeMap<String, Value> = serde_json::from_str(&raw)?;
        metadata.insert(TERMINAL_REASON_KEY.to_string(), Value::from(reason));

        tx.execute(
            "UPDATE url_records
             SET attempts = MAX(attempts, ?1), error = 1, metadata = ?2, updated_at = ?3
             WHERE collection = ?4 AND url = ?5",
            params![
                self.max_attempts,
                serde_json::to_string(&metadata)?,
                now_string(),
                collection,
                url
            ],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn sync_current_page(
        &mut self,
        collection: &str,
        url: &str,
        page_url: &str,
    ) -> FrontierResult<()> {
        let changed = self.conn.execute(
            "UPDATE url_records SET current_page_url = ?1, updated_at = ?2
             WHERE collection = ?3 AND url = ?4",
            params![page_url, now_string(), collection, url],
        )?;
        if changed == 0 {
            return Err(Self::not_found(collection, url));
        }
        Ok(())
    }

    fn clear_current_page(&mut self, collection: &str, url: &str) -> FrontierResult<()> {
        let changed = self.conn.execute(
            "UPDATE url_records SET current_page_url = NULL, updated_at = ?1
             WHERE collection = ?2 AND url = ?3",
            params![now_string(), collection, url],
        )?;
        if changed == 0 {
            return Err(Self::not_found(collection, url));
        }
        Ok(())
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    // ===== Entities =====

    fn upsert_entity(
        &mut self,
        collection: &str,
        entity: &Entity,
        allow_duplicates: bool,
    ) -> FrontierResult<bool> {
        let data = serde_json::to_string(entity)?;
        let now = now_string();

        let tx = self.conn.transaction()?;
        let replaced = if allow_duplicates {
            0
        } else {
            tx.execute(
                "UPDATE entities SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND url = ?4",
                params![data, now, collection, entity.url],
            )?
        };

        if replaced == 0 {
            tx.execute(
                "INSERT INTO entities (collection, url, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![collection, entity.url, data, now],
            )?;
        }
        tx.commit()?;

        Ok(replaced == 0)
    }

    fn count_entities(&self, collection: &str) -> FrontierResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn entities_page(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
    ) -> FrontierResult<Vec<Entity>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM entities WHERE collection = ?1 ORDER BY url, id LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt
            .query_map(params![collection, limit as i64, offset as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entities = Vec::with_capacity(rows.len());
        for raw in rows {
            entities.push(serde_json::from_str(&raw)?);
        }
        Ok(entities)
    }

    // ===== Statistics =====

    fn count_by_state(&self, collection: &str) -> FrontierResult<CollectionCounts> {
        let counts = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 0 AND attempts < ?2 AND error = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 0 AND attempts < ?2 AND error = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 0 AND attempts >= ?2 THEN 1 ELSE 0 END), 0)
             FROM url_records WHERE collection = ?1",
            params![collection, self.max_attempts],
            |row| {
                Ok(CollectionCounts {
                    pending: row.get::<_, i64>(0)? as u64,
                    errored: row.get::<_, i64>(1)? as u64,
                    complete: row.get::<_, i64>(2)? as u64,
                    terminal: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(counts)
    }
}
