//! Frontier statistics
//!
//! Per-collection record counts and entity totals, printed by `--stats`.

use crate::frontier::{FrontierResult, FrontierStore};

/// Record counts of one collection, split by derived state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionCounts {
    /// Eligible records that have never failed
    pub pending: u64,

    /// Eligible records with at least one failure
    pub errored: u64,

    pub complete: u64,

    /// Records whose attempts reached the ceiling
    pub terminal: u64,
}

impl CollectionCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.errored + self.complete + self.terminal
    }

    /// Records still eligible for a batch
    pub fn eligible(&self) -> u64 {
        self.pending + self.errored
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatistics {
    pub name: String,
    pub records: CollectionCounts,
    pub entities: u64,
}

/// Statistics summary over every collection in the store
#[derive(Debug, Clone, Default)]
pub struct FrontierStatistics {
    pub collections: Vec<CollectionStatistics>,
}

impl FrontierStatistics {
    pub fn total_records(&self) -> u64 {
        self.collections.iter().map(|c| c.records.total()).sum()
    }

    pub fn total_entities(&self) -> u64 {
        self.collections.iter().map(|c| c.entities).sum()
    }

    pub fn get(&self, name: &str) -> Option<&CollectionStatistics> {
        self.collections.iter().find(|c| c.name == name)
    }
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The frontier backend to query
///
/// # Returns
///
/// * `Ok(FrontierStatistics)` - Successfully loaded statistics
/// * `Err(FrontierError)` - Failed to query statistics
pub fn load_statistics(store: &dyn FrontierStore) -> FrontierResult<FrontierStatistics> {
    let mut collections = Vec::new();

    for name in store.list_collections()? {
        let records = store.count_by_state(&name)?;
        let entities = store.count_entities(&name)?;
        collections.push(CollectionStatistics {
            name,
            records,
            entities,
        });
    }

    Ok(FrontierStatistics { collections })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &FrontierStatistics) {
    println!("=== Frontier Statistics ===\n");

    println!("Overview:");
    println!("  Collections: {}", stats.collections.len());
    println!("  Total records: {}", stats.total_records());
    println!("  Total entities: {}", stats.total_entities());
    println!();

    for collection in &stats.collections {
        let counts = &collection.records;
        println!("{}:", collection.name);
        if counts.total() > 0 {
            let pct = |n: u64| (n as f64 / counts.total() as f64) * 100.0;
            println!("  Pending:  {} ({:.1}%)", counts.pending, pct(counts.pending));
            println!("  Errored:  {} ({:.1}%)", counts.errored, pct(counts.errored));
            println!("  Complete: {} ({:.1}%)", counts.complete, pct(counts.complete));
            println!("  Terminal: {} ({:.1}%)", counts.terminal, pct(counts.terminal));
        }
        if collection.entities > 0 {
            println!("  Entities: {}", collection.entities);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::{NewRecord, SqliteFrontier};

    #[test]
    fn test_counts_total_and_eligible() {
        let counts = CollectionCounts {
            pending: 3,
            errored: 2,
            complete: 4,
            terminal: 1,
        };
        assert_eq!(counts.total(), 10);
        assert_eq!(counts.eligible(), 5);
    }

    #[test]
    fn test_load_statistics() {
        let mut store = SqliteFrontier::new_in_memory(2).unwrap();
        store.register_root_collection("seeds").unwrap();
        store
            .enqueue(
                "seeds",
                &[
                    NewRecord::new("https://a.test/1"),
                    NewRecord::new("https://a.test/2"),
                    NewRecord::new("https://a.test/3"),
                ],
                None,
            )
            .unwrap();
        store.mark_complete("seeds", "https://a.test/1").unwrap();
        store.mark_error("seeds", "https://a.test/2").unwrap();
        store
            .mark_max_attempts("seeds", "https://a.test/3", "gone")
            .unwrap();

        let stats = load_statistics(&store).unwrap();
        let seeds = stats.get("seeds").unwrap();

        assert_eq!(seeds.records.complete, 1);
        assert_eq!(seeds.records.errored, 1);
        assert_eq!(seeds.records.terminal, 1);
        assert_eq!(seeds.records.pending, 0);
        assert_eq!(stats.total_records(), 3);
        assert_eq!(stats.total_entities(), 0);
    }
}
