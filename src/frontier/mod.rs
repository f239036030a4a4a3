//! Frontier store for harvested URLs
//!
//! This module persists the per-collection URL frontier and the extracted
//! entities:
//! - SQLite schema and initialization
//! - Eligible-batch selection against the retry ceiling
//! - Complete / error / terminal state transitions
//! - Paginated resume points
//! - Entity upsert and paged reads for export

mod record;
mod schema;
mod shared;
mod sqlite;
mod stats;
mod traits;

pub use record::{EnqueueOutcome, NewRecord, RecordState, UrlRecord, TERMINAL_REASON_KEY};
pub use shared::SharedFrontier;
pub use sqlite::SqliteFrontier;
pub use stats::{
    load_statistics, print_statistics, CollectionCounts, CollectionStatistics, FrontierStatistics,
};
pub use traits::{FrontierError, FrontierResult, FrontierStore};

use std::path::Path;

/// Opens (or creates) a frontier database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `max_attempts` - Retry ceiling applied by batch selection
pub fn open_frontier(path: &Path, max_attempts: u32) -> FrontierResult<SqliteFrontier> {
    SqliteFrontier::new(path, max_attempts)
}
