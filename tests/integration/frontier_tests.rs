//! Store deadline behavior through the shared frontier handle

use crate::support::{create_test_config, FakeBackend, RecordingStore, Scripted};
use harvester::config::BackendKind;
use harvester::frontier::{FrontierError, NewRecord, SharedFrontier};
use harvester::{Orchestrator, ProcessorConfig, Schema};
use std::sync::Arc;
use std::time::Duration;

fn create_stalled_frontier() -> SharedFrontier {
    let store = RecordingStore::new(3).stall(Duration::from_millis(300));
    SharedFrontier::new(store, Duration::from_millis(50))
}

#[tokio::test]
async fn test_slow_store_call_hits_deadline() {
    let frontier = create_stalled_frontier();
    frontier.register_root_collection("seeds").await.unwrap();

    let result = frontier.next_batch("seeds", 10).await;

    match result {
        Err(FrontierError::Timeout { op, after }) => {
            assert_eq!(op, "next_batch");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected a store timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_store_aborts_processor_without_hanging() {
    let frontier = create_stalled_frontier();
    frontier.register_root_collection("products").await.unwrap();
    frontier
        .enqueue("products", vec![NewRecord::new("https://x.test/p/1")], None)
        .await
        .unwrap();

    let backend = Arc::new(FakeBackend::new().fallback(Scripted::Transient));
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let detail = ProcessorConfig::detail("product", "acme", "products", "entities", Schema::new());
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run_processor(Arc::new(detail)),
    )
    .await
    .unwrap()
    .unwrap();

    let processor = &summary.processors[0];
    assert!(processor.aborted.as_deref().unwrap_or("").contains("timed out"));
    assert_eq!(processor.processed, 0);
    assert!(backend.calls().is_empty());
}
