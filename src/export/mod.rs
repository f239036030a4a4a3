//! Bulk export of entity collections to CSV

use crate::extract::Entity;
use crate::frontier::FrontierStore;
use crate::HarvestError;
use chrono::Utc;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Result of one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: u64,
    pub pages: u64,
}

/// Writes every entity of `collection` to `<dir>/<collection>_<date>.csv`
///
/// Entities are read `page_size` at a time, ordered by url, so the whole
/// collection is never held in memory.
///
/// # Arguments
///
/// * `store` - The frontier store holding the entities
/// * `collection` - Destination collection to dump
/// * `dir` - Output directory (created if missing)
/// * `page_size` - Entities fetched per store query
pub fn export_collection(
    store: &dyn FrontierStore,
    collection: &str,
    dir: &Path,
    page_size: usize,
) -> Result<ExportSummary, HarvestError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "{}_{}.csv",
        collection,
        Utc::now().format("%Y-%m-%d")
    ));

    let expected = store.count_entities(collection)?;
    tracing::info!("Exporting {} entities from {} to {}", expected, collection, path.display());

    let mut writer = csv::Writer::from_writer(File::create(&path)?);
    writer.write_record(Entity::csv_header())?;

    let page_size = page_size.max(1);
    let mut rows = 0u64;
    let mut pages = 0u64;
    loop {
        let page = store.entities_page(collection, rows, page_size)?;
        if page.is_empty() {
            break;
        }
        pages += 1;
        for entity in &page {
            writer.write_record(entity.csv_record())?;
        }
        rows += page.len() as u64;
        tracing::debug!("Exported page {} ({} rows so far)", pages, rows);
        if page.len() < page_size {
            break;
        }
    }
    writer.flush()?;

    tracing::info!("Export of {} complete: {} rows", collection, rows);
    Ok(ExportSummary { path, rows, pages })
}
