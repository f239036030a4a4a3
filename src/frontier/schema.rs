//! Database schema for the frontier store

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Collections whose records need no parent
CREATE TABLE IF NOT EXISTS root_collections (
    name TEXT PRIMARY KEY
);

-- Per-URL frontier records
CREATE TABLE IF NOT EXISTS url_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    url TEXT NOT NULL,
    parent TEXT,
    status INTEGER NOT NULL DEFAULT 0,
    error INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT '{}',
    current_page_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(collection, url)
);

CREATE INDEX IF NOT EXISTS idx_url_records_eligible ON url_records(collection, status, attempts);

-- Extracted entities; no unique index so duplicate-friendly collections work
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    url TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_collection_url ON entities(collection, url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
