//! End-to-end orchestration scenarios against a scripted backend

use crate::support::{
    create_test_config, create_test_frontier, seed, FakeBackend, RecordingStore, Scripted,
};
use harvester::config::BackendKind;
use harvester::extract::{FieldResolver, MultiSelector, Schema, SingleSelector};
use harvester::frontier::SharedFrontier;
use harvester::{Orchestrator, ProcessorConfig, ProxyStrategy};
use std::sync::Arc;
use std::time::Duration;

const SEED: &str = "https://x.test";

fn listing_html() -> String {
    r#"<html><body>
        <a class="item" href="/p/1">One</a>
        <a class="item" href="/p/2">Two</a>
        <a class="item" href="https://x.test/p/3">Three</a>
        <a class="nav" href="/about">About</a>
    </body></html>"#
        .to_string()
}

fn listing_processor() -> ProcessorConfig {
    ProcessorConfig::discovery(
        "listing",
        "acme",
        "seeds",
        "products",
        MultiSelector::new().select("a.item", "href"),
    )
}

#[tokio::test]
async fn test_discovery_records_children_with_parent() {
    let frontier = create_test_frontier(3);
    seed(&frontier, "seeds", &[SEED.to_string()]).await;

    let backend = Arc::new(FakeBackend::new().on(SEED, Scripted::Html(listing_html())));
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend);

    let summary = orchestrator
        .run_processor(Arc::new(listing_processor()))
        .await
        .unwrap();
    assert_eq!(summary.discovered(), 3);

    let children = frontier.next_batch("products", 100).await.unwrap();
    let urls: Vec<&str> = children.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://x.test/p/1", "https://x.test/p/2", "https://x.test/p/3"]
    );
    for child in &children {
        assert_eq!(child.parent.as_deref(), Some(SEED));
        assert!(!child.status);
        assert_eq!(child.attempts, 0);
    }

    let parent = frontier.get_record("seeds", SEED).await.unwrap().unwrap();
    assert!(parent.status);
}

#[tokio::test]
async fn test_rediscovery_before_completion_does_not_duplicate() {
    let frontier = create_test_frontier(3);
    seed(&frontier, "seeds", &[SEED.to_string()]).await;

    for _ in 0..2 {
        let backend = Arc::new(FakeBackend::new().on(SEED, Scripted::Html(listing_html())));
        let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
            .unwrap()
            .with_backend(BackendKind::Http, backend);
        orchestrator
            .run_processor(Arc::new(listing_processor().skip_completion(true)))
            .await
            .unwrap();
    }

    let stats = frontier.statistics().await.unwrap();
    assert_eq!(stats.get("products").unwrap().records.total(), 3);
    let parent = frontier.get_record("seeds", SEED).await.unwrap().unwrap();
    assert!(!parent.status);
}

#[tokio::test]
async fn test_empty_required_field_marks_error() {
    let frontier = create_test_frontier(3);
    let url = "https://x.test/p/1".to_string();
    seed(&frontier, "products", &[url.clone()]).await;

    let backend = Arc::new(FakeBackend::new().on(
        &url,
        Scripted::Html("<html><body><p>No title here</p></body></html>".to_string()),
    ));
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend);

    let detail = ProcessorConfig::detail(
        "product",
        "acme",
        "products",
        "entities",
        Schema::new()
            .field("ProductName", SingleSelector::new("h1"))
            .field("Brand", FieldResolver::literal("Acme")),
    )
    .required_fields(["ProductName"]);

    let summary = orchestrator.run_processor(Arc::new(detail)).await.unwrap();
    assert_eq!(summary.failed(), 1);

    let record = frontier.get_record("products", &url).await.unwrap().unwrap();
    assert!(!record.status);
    assert!(record.error);
    assert_eq!(record.attempts, 1);
    assert_eq!(frontier.count_entities("entities").await.unwrap(), 0);
}

#[tokio::test]
async fn test_item_cap_stops_after_exact_count() {
    let frontier = create_test_frontier(3);
    let urls: Vec<String> = (0..20).map(|i| format!("https://x.test/p/{}", i)).collect();
    seed(&frontier, "products", &urls).await;

    let backend = Arc::new(
        FakeBackend::new()
            .fallback(Scripted::Html("<html><h1>Widget</h1></html>".to_string()))
            .delay(Duration::from_millis(10)),
    );
    let config = create_test_config("dev-item-cap = 5\nconcurrency-limit = 2", "");
    let orchestrator = Orchestrator::new(&config, frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let detail = ProcessorConfig::detail(
        "product",
        "acme",
        "products",
        "entities",
        Schema::new().field("ProductName", SingleSelector::new("h1")),
    );

    let summary = orchestrator.run_processor(Arc::new(detail)).await.unwrap();

    assert!(summary.cap_reached);
    assert_eq!(summary.processed(), 5);
    assert_eq!(orchestrator.items_processed(), 5);
    assert_eq!(backend.calls().len(), 5);
    assert_eq!(frontier.count_entities("entities").await.unwrap(), 5);

    let stats = frontier.statistics().await.unwrap();
    let products = stats.get("products").unwrap();
    assert_eq!(products.records.complete, 5);
    assert_eq!(products.records.pending, 15);
}

#[tokio::test]
async fn test_rotation_advances_proxy_on_each_failure() {
    let frontier = create_test_frontier(10);
    let url = "https://x.test/p/1".to_string();
    seed(&frontier, "products", &[url.clone()]).await;

    let backend = Arc::new(FakeBackend::new().on(&url, Scripted::Transient));
    let config = create_test_config(
        "max-retry-attempts = 10\nconcurrency-limit = 1",
        r#"
[proxy]
strategy = "rotation"

[[proxy.servers]]
server = "http://10.0.0.1:8080"

[[proxy.servers]]
server = "http://10.0.0.2:8080"

[[proxy.servers]]
server = "http://10.0.0.3:8080"
"#,
    );
    let orchestrator = Orchestrator::new(&config, frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let detail = ProcessorConfig::detail("product", "acme", "products", "entities", Schema::new());
    orchestrator.run_processor(Arc::new(detail)).await.unwrap();

    let used: Vec<String> = backend
        .calls()
        .into_iter()
        .map(|(_, proxy)| proxy.unwrap())
        .collect();
    let expected: Vec<String> = (0..10)
        .map(|i| format!("http://10.0.0.{}:8080", i % 3 + 1))
        .collect();
    assert_eq!(used, expected);

    let record = frontier.get_record("products", &url).await.unwrap().unwrap();
    assert_eq!(record.attempts, 10);
    assert!(frontier.next_batch("products", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_not_found_is_terminal_immediately() {
    let frontier = create_test_frontier(3);
    let url = "https://x.test/gone".to_string();
    seed(&frontier, "products", &[url.clone()]).await;

    let backend = Arc::new(FakeBackend::new().on(&url, Scripted::NotFound));
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let detail = ProcessorConfig::detail("product", "acme", "products", "entities", Schema::new());
    orchestrator.run_processor(Arc::new(detail)).await.unwrap();

    assert_eq!(backend.calls().len(), 1);
    let record = frontier.get_record("products", &url).await.unwrap().unwrap();
    assert_eq!(record.attempts, 3);
    assert!(record.terminal_reason().is_some());
}

#[tokio::test]
async fn test_panicking_task_degrades_to_url_failure() {
    let frontier = create_test_frontier(3);
    let bad = "https://x.test/p/bad".to_string();
    let good = "https://x.test/p/good".to_string();
    seed(&frontier, "products", &[bad.clone(), good.clone()]).await;

    let backend = Arc::new(
        FakeBackend::new()
            .on(&bad, Scripted::Panic)
            .on(&good, Scripted::Html("<h1>Widget</h1>".to_string())),
    );
    let orchestrator = Orchestrator::new(&create_test_config("concurrency-limit = 1", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend);

    let detail = ProcessorConfig::detail(
        "product",
        "acme",
        "products",
        "entities",
        Schema::new().field("ProductName", SingleSelector::new("h1")),
    );
    let summary = orchestrator.run_processor(Arc::new(detail)).await.unwrap();

    assert_eq!(summary.processors[0].panicked, 1);
    assert_eq!(summary.succeeded(), 1);

    let bad_record = frontier.get_record("products", &bad).await.unwrap().unwrap();
    assert_eq!(bad_record.attempts, 1);
    assert!(!bad_record.status);
    assert!(frontier.get_record("products", &good).await.unwrap().unwrap().status);
}

#[tokio::test]
async fn test_configuration_errors_halt_the_run() {
    let frontier = create_test_frontier(3);
    seed(&frontier, "products", &["https://x.test/p/1".to_string()]).await;

    let backend = Arc::new(FakeBackend::new().fallback(Scripted::Html("<h1>x</h1>".to_string())));
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let unknown_field =
        ProcessorConfig::detail("product", "acme", "products", "entities", Schema::new())
            .required_fields(["Colour"]);
    let err = orchestrator
        .run_processor(Arc::new(unknown_field))
        .await
        .unwrap_err();
    assert!(err.is_fatal());

    let empty_pool = ProcessorConfig::detail("product", "acme", "products", "entities", Schema::new())
        .proxy_strategy(ProxyStrategy::Rotation);
    let err = orchestrator
        .run_processor(Arc::new(empty_pool))
        .await
        .unwrap_err();
    assert!(err.is_fatal());

    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_pagination_resumes_from_stored_page() {
    let frontier = create_test_frontier(3);
    let list = "https://x.test/list";
    seed(&frontier, "seeds", &[list.to_string()]).await;

    let page = |item: &str, next: Option<&str>| {
        let next = next
            .map(|n| format!(r#"<a class="next" href="{}">Next</a>"#, n))
            .unwrap_or_default();
        Scripted::Html(format!(
            r#"<html><a class="item" href="/p/{}">x</a>{}</html>"#,
            item, next
        ))
    };

    let backend = Arc::new(
        FakeBackend::new()
            .on(list, page("1", Some("/list?page=2")))
            .on("https://x.test/list?page=2", page("2", Some("/list?page=3")))
            .on("https://x.test/list?page=3", Scripted::Transient),
    );
    let processor = Arc::new(listing_processor().paginate("a.next", 10));

    let first = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());
    first.run_processor(Arc::clone(&processor)).await.unwrap();

    let record = frontier.get_record("seeds", list).await.unwrap().unwrap();
    assert!(!record.status);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.current_page_url.as_deref(), Some("https://x.test/list?page=3"));
    assert_eq!(frontier.next_batch("products", 10).await.unwrap().len(), 2);

    backend.set("https://x.test/list?page=3", page("3", None));
    let calls_before = backend.calls().len();

    let second = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());
    second.run_processor(processor).await.unwrap();

    let resumed: Vec<String> = backend.urls_called().split_off(calls_before);
    assert_eq!(resumed, vec!["https://x.test/list?page=3".to_string()]);
    assert!(frontier.get_record("seeds", list).await.unwrap().unwrap().status);
    assert_eq!(frontier.next_batch("products", 10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_finished_pagination_restarts_from_first_page() {
    let frontier = create_test_frontier(3);
    let list = "https://x.test/list";
    seed(&frontier, "seeds", &[list.to_string()]).await;

    let backend = Arc::new(
        FakeBackend::new()
            .on(
                list,
                Scripted::Html(
                    r#"<html><a class="item" href="/p/1">x</a><a class="next" href="/list?page=2">Next</a></html>"#
                        .to_string(),
                ),
            )
            .on(
                "https://x.test/list?page=2",
                Scripted::Html(r#"<html><a class="item" href="/p/2">x</a></html>"#.to_string()),
            ),
    );
    let processor = Arc::new(
        listing_processor()
            .paginate("a.next", 10)
            .skip_completion(true),
    );

    for _ in 0..2 {
        let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
            .unwrap()
            .with_backend(BackendKind::Http, backend.clone());
        orchestrator.run_processor(Arc::clone(&processor)).await.unwrap();
    }

    assert_eq!(
        backend.urls_called(),
        vec![
            list.to_string(),
            "https://x.test/list?page=2".to_string(),
            list.to_string(),
            "https://x.test/list?page=2".to_string(),
        ]
    );
    let record = frontier.get_record("seeds", list).await.unwrap().unwrap();
    assert!(record.current_page_url.is_none());
    assert!(!record.status);
}

#[tokio::test]
async fn test_batch_queries_stay_within_batch_size() {
    let store = RecordingStore::new(3);
    let limits = store.limits();
    let frontier = SharedFrontier::new(store, Duration::from_secs(5));

    let urls: Vec<String> = (0..50).map(|i| format!("https://x.test/p/{}", i)).collect();
    seed(&frontier, "products", &urls).await;

    let backend = Arc::new(FakeBackend::new().fallback(Scripted::Transient));
    let orchestrator = Orchestrator::new(&create_test_config("batch-size = 5", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let detail = ProcessorConfig::detail("product", "acme", "products", "entities", Schema::new());
    let summary = orchestrator.run_processor(Arc::new(detail)).await.unwrap();

    assert_eq!(summary.processed(), 50);
    assert_eq!(summary.failed(), 50);
    assert_eq!(backend.calls().len(), 50);

    let limits = limits.lock().unwrap().clone();
    assert_eq!(limits.len(), 11);
    assert!(limits.iter().all(|&limit| limit == 5));

    // Failed records stay eligible for the next run
    assert_eq!(frontier.next_batch("products", 100).await.unwrap().len(), 50);
}

#[tokio::test]
async fn test_hung_navigation_times_out_as_retryable_failure() {
    let frontier = create_test_frontier(3);
    let url = "https://x.test/slow".to_string();
    seed(&frontier, "products", &[url.clone()]).await;

    let backend = Arc::new(
        FakeBackend::new()
            .fallback(Scripted::Html("<html><h1>late</h1></html>".to_string()))
            .delay(Duration::from_millis(500)),
    );
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone())
        .unwrap()
        .with_backend(BackendKind::Http, backend.clone());

    let detail = ProcessorConfig::detail(
        "product",
        "acme",
        "products",
        "entities",
        Schema::new().field("ProductName", SingleSelector::new("h1")),
    )
    .timeout(Duration::from_millis(50));
    let summary = orchestrator.run_processor(Arc::new(detail)).await.unwrap();

    assert_eq!(summary.failed(), 1);
    assert_eq!(backend.calls().len(), 1);

    let record = frontier.get_record("products", &url).await.unwrap().unwrap();
    assert!(record.error);
    assert!(!record.status);
    assert_eq!(record.attempts, 1);
    assert!(record.terminal_reason().is_none());
    assert_eq!(frontier.count_entities("entities").await.unwrap(), 0);
}
