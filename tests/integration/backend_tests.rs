//! Backend, submission and full-run tests against wiremock servers

use crate::support::{create_test_config, create_test_frontier};
use harvester::config::SubmissionConfig;
use harvester::extract::{Entity, FieldResolver, MultiSelector, Schema, SingleSelector};
use harvester::navigation::{
    JsonApiBackend, NavigationBackend, NavigationError, NavigationOptions, PageResult,
    StaticHttpBackend,
};
use harvester::pipeline::{HttpSubmitter, PipelineError, Submitter};
use harvester::site::SiteDefinition;
use harvester::{Orchestrator, ProcessorConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_static_http_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><h1>Hi</h1></html>"))
        .mount(&server)
        .await;

    let url = format!("{}/page", server.uri());
    let page = StaticHttpBackend::new()
        .fetch(&url, None, &NavigationOptions::default())
        .await
        .unwrap();

    assert_eq!(page.status(), 200);
    assert_eq!(page.kind(), "document");
    assert!(page.body().contains("<h1>Hi</h1>"));
}

#[tokio::test]
async fn test_static_http_classifies_not_found_and_throttling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such page"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/teapot"))
        .respond_with(ResponseTemplate::new(418))
        .mount(&server)
        .await;

    let backend = StaticHttpBackend::new();
    let options = NavigationOptions::default();

    let missing = backend
        .fetch(&format!("{}/missing", server.uri()), None, &options)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
    assert_eq!(missing.captured_body(), Some("no such page"));

    let busy = backend
        .fetch(&format!("{}/busy", server.uri()), None, &options)
        .await
        .unwrap_err();
    assert!(busy.is_retryable());
    assert!(!busy.is_not_found());

    let teapot = backend
        .fetch(&format!("{}/teapot", server.uri()), None, &options)
        .await
        .unwrap_err();
    assert!(!teapot.is_retryable());
}

#[tokio::test]
async fn test_json_api_decodes_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/product"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"product": {"name": "Widget", "brand": "Acme"}}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let backend = JsonApiBackend::new();
    let options = NavigationOptions::default();

    let page = backend
        .fetch(&format!("{}/api/product", server.uri()), None, &options)
        .await
        .unwrap();
    assert_eq!(page.kind(), "json");
    assert_eq!(page.json().unwrap()["product"]["brand"], "Acme");

    let broken = backend
        .fetch(&format!("{}/api/broken", server.uri()), None, &options)
        .await
        .unwrap_err();
    assert!(matches!(broken, NavigationError::Decode { .. }));
    assert!(!broken.is_retryable());
    assert_eq!(broken.captured_body(), Some("<html>not json</html>"));
}

#[tokio::test]
async fn test_json_pages_resolve_literals_as_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/product"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"product": {"name": "Widget", "images": ["a.png", "b.png"]}}"#),
        )
        .mount(&server)
        .await;

    let url = format!("{}/api/product", server.uri());
    let page = JsonApiBackend::new()
        .fetch(&url, None, &NavigationOptions::default())
        .await
        .unwrap();
    assert!(matches!(page, PageResult::Json(_)));

    let frontier = create_test_frontier(3);
    crate::support::seed(&frontier, "api", &[url.clone()]).await;
    let record = frontier.get_record("api", &url).await.unwrap().unwrap();

    let schema = Schema::new()
        .field("ProductName", FieldResolver::literal("product.name"))
        .field("ImageUrls", FieldResolver::literal("product.images"));
    let ctx = harvester::extract::FetchContext::new(&record, &page, None);
    let entity = harvester::extract::map_entity(&schema, &ctx).unwrap();

    assert_eq!(entity.product_name, "Widget");
    assert_eq!(entity.image_urls, vec!["a.png", "b.png"]);
}

fn submission_config(server: &MockServer) -> SubmissionConfig {
    SubmissionConfig {
        endpoint: format!("{}/entities", server.uri()),
        username: "user".to_string(),
        password: "pass".to_string(),
    }
}

#[tokio::test]
async fn test_submitter_posts_entity_with_credentials() {
    let server = MockServer::start().await;
    let mut entity = Entity::new("https://x.test/p/1");
    entity.product_name = "Widget".to_string();

    Mock::given(method("POST"))
        .and(path("/entities"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .and(header(
            "idempotency-key",
            HttpSubmitter::idempotency_key(&entity.url).as_str(),
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let submitter = HttpSubmitter::new(&submission_config(&server)).unwrap();
    submitter.submit(&entity).await.unwrap();
}

#[tokio::test]
async fn test_submitter_reports_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/entities"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    let submitter = HttpSubmitter::new(&submission_config(&server)).unwrap();
    let err = submitter
        .submit(&Entity::new("https://x.test/p/1"))
        .await
        .unwrap_err();

    match err {
        PipelineError::Submission { status, message, .. } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "database down");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_full_site_run_over_http() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <a class="product" href="/p/1">One</a>
                <a class="product" href="/p/2">Two</a>
                <a class="product" href="/p/1">One again</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    for (id, name) in [("1", "Widget"), ("2", "Gadget")] {
        Mock::given(method("GET"))
            .and(path(format!("/p/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><h1>{} NEW</h1><img class="main" src="/img/{}.png"></html>"#,
                name, id
            )))
            .mount(&server)
            .await;
    }

    let site = SiteDefinition::new("shop", "shop_seeds")
        .seed(format!("{}/catalog", base))
        .processor(ProcessorConfig::discovery(
            "catalog",
            "shop",
            "shop_seeds",
            "shop_products",
            MultiSelector::new().select("a.product", "href").unique(true),
        ))
        .processor(
            ProcessorConfig::detail(
                "product",
                "shop",
                "shop_products",
                "shop_entities",
                Schema::new()
                    .field("ProductName", SingleSelector::new("h1").try_strip(r"\s+NEW$").unwrap())
                    .field("Brand", FieldResolver::literal("Acme"))
                    .field("ImageUrls", MultiSelector::new().select("img.main", "src")),
            )
            .required_fields(["ProductName", "ImageUrls"]),
        );

    let frontier = create_test_frontier(3);
    let orchestrator = Orchestrator::new(&create_test_config("", ""), frontier.clone()).unwrap();
    let summary = orchestrator.run_site(&site).await.unwrap();
    orchestrator.shutdown().await;

    assert_eq!(summary.discovered(), 2);
    assert_eq!(summary.failed(), 0);

    let entities = frontier.entities_page("shop_entities", 0, 10).await.unwrap();
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].product_name, "Widget");
    assert_eq!(entities[0].brand, "Acme");
    assert_eq!(entities[0].image_urls, vec![format!("{}/img/1.png", base)]);
    assert_eq!(entities[1].product_name, "Gadget");

    let stats = frontier.statistics().await.unwrap();
    assert_eq!(stats.get("shop_products").unwrap().records.complete, 2);
    assert_eq!(stats.get("shop_seeds").unwrap().records.complete, 1);
}
