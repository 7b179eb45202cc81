//! End-to-end sync behaviour against a mock CMS.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use storesync_cache::{CacheError, CacheResult, CacheStore, InMemoryCache};
use storesync_strapi::prelude::*;
use storesync_strapi::{InMemoryRepository, RateLimitPolicy, StrapiConfigBuilder};
use tokio::time::Instant;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, ignore_threshold: Duration) -> StrapiConfigBuilder {
    StrapiConfig::builder()
        .base_url(server.uri())
        .default_user("svc@example.com", "svc-pw")
        .admin("admin@example.com", "admin-pw")
        .self_test()
        .ignore_threshold(ignore_threshold)
        .rate_limit(RateLimitPolicy::default().with_max_attempts(3))
}

fn engine(server: &MockServer, ignore_threshold: Duration) -> StrapiEngine {
    StrapiEngine::in_memory(config(server, ignore_threshold).build()).unwrap()
}

/// Ledger store whose reads fail for one entity.
#[derive(Default)]
struct FailingStore {
    inner: InMemoryCache,
    broken_prefix: &'static str,
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        if key.starts_with(self.broken_prefix) {
            return Err(CacheError::Other(format!("read of {key} failed")));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear().await
    }
}

async fn requests_to(server: &MockServer, verb: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .count()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/local"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jwt": "usr", "user": {"id": 1}})),
        )
        .mount(server)
        .await;
}

fn updated(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 7, "medusa_id": id}}))
}

#[tokio::test]
async fn test_create_existing_entry_is_idempotent() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("filters[medusa_id]", "prod_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 9, "medusa_id": "prod_1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_secs(3));
    let result = engine
        .sync()
        .create_product(&json!({"id": "prod_1", "title": "Shirt"}))
        .await
        .unwrap();

    assert_eq!(result.status, 302);
    assert_eq!(result.data.unwrap()["id"], 9);
}

#[tokio::test]
async fn test_second_create_finds_the_first() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("filters[medusa_id]", "prod_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("filters[medusa_id]", "prod_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 7, "medusa_id": "prod_1"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/products"))
        .respond_with(updated("prod_1"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_secs(3));
    let product = json!({"id": "prod_1", "title": "Shirt"});

    let first = engine.sync().create_product(&product).await.unwrap();
    assert_eq!(first.status, 200);

    let second = engine.sync().create_product(&product).await.unwrap();
    assert_eq!(second.status, 302);
    assert_eq!(second.data.unwrap()["id"], 7);
    assert_eq!(requests_to(&server, "GET", "/api/products").await, 2);
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/local"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jwt": "stale", "user": {"id": 1}})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/local"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jwt": "fresh", "user": {"id": 1}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/regions/reg_1"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/regions/reg_1"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(updated("reg_1"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_secs(3));
    let result = engine
        .sync()
        .update_region(&json!({"id": "reg_1", "name": "EU"}))
        .await
        .unwrap();

    assert_eq!(result.status, 200);
    assert_eq!(requests_to(&server, "PUT", "/api/regions/reg_1").await, 2);
    assert_eq!(requests_to(&server, "POST", "/api/auth/local").await, 2);
    assert_eq!(
        engine.client().sessions().cached_token("svc@example.com"),
        Some("fresh".to_string())
    );
}

#[tokio::test]
async fn test_service_account_gate_holds_content_calls() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/products"))
        .respond_with(updated("prod_1"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server, Duration::from_secs(3))
        .await_service_account(Duration::from_millis(50))
        .build();
    let engine = StrapiEngine::in_memory(config).unwrap();
    let product = json!({"id": "prod_1", "title": "Shirt"});

    let held = engine.sync().create_product(&product).await.unwrap();
    assert_eq!(held.status, 400);
    assert!(server.received_requests().await.unwrap().is_empty());

    let state = engine.state().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.set_service_account_ready(true);
    });
    assert!(
        engine
            .state()
            .wait_for_service_account(Duration::from_secs(5))
            .await
    );
    let created = engine.sync().create_product(&product).await.unwrap();
    assert_eq!(created.status, 200);
}

#[tokio::test]
async fn test_own_writes_are_not_echoed() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/products/prod_1"))
        .respond_with(updated("prod_1"))
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_millis(200));
    let repository = Arc::new(InMemoryRepository::new());
    repository
        .insert(
            EntityKind::Product,
            json!({"id": "prod_1", "handle": "shirt", "title": "Shirt"}),
        )
        .unwrap();
    let reverse = engine.reverse(repository.clone());

    let pushed = engine
        .sync()
        .update_product(&json!({"id": "prod_1", "handle": "shirt", "title": "Shirt"}))
        .await
        .unwrap();
    assert_eq!(pushed.status, 200);

    // The CMS echoes the write straight back
    let echo = json!({"medusa_id": "prod_1", "handle": "shirt", "title": "Edited"});
    assert_eq!(
        reverse.update_product("prod_1", &echo).await.unwrap(),
        ReverseSync::Skipped
    );
    assert!(repository.patches().is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;

    let applied = reverse.update_product("prod_1", &echo).await.unwrap();
    assert!(matches!(applied, ReverseSync::Updated(_)));

    // The commerce side now sees its own update event for the CMS edit
    let bounced = engine
        .sync()
        .update_product(&json!({"id": "prod_1", "handle": "shirt", "title": "Edited"}))
        .await
        .unwrap();
    assert_eq!(bounced.status, 400);
    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .count();
    assert_eq!(puts, 1);
}

#[tokio::test]
async fn test_rate_limit_delay_becomes_retry_window() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/regions/reg_1"))
        .respond_with(ResponseTemplate::new(429).insert_header("x-retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/regions/reg_1"))
        .respond_with(updated("reg_1"))
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_secs(3));
    let started = Instant::now();
    let result = engine
        .sync()
        .update_region(&json!({"id": "reg_1", "name": "EU"}))
        .await
        .unwrap();

    assert_eq!(result.status, 200);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(engine.state().retry_window(), Duration::from_secs(1));
}

#[tokio::test]
async fn test_reset_header_alone_sets_retry_window() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let reset = chrono::Utc::now().timestamp().to_string();
    Mock::given(method("PUT"))
        .and(path("/api/regions/reg_1"))
        .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", reset.as_str()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/regions/reg_1"))
        .respond_with(updated("reg_1"))
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_secs(3));
    let started = Instant::now();
    let result = engine
        .sync()
        .update_region(&json!({"id": "reg_1", "name": "EU"}))
        .await
        .unwrap();

    // Time left until the reset plus the two second margin
    let window = engine.state().retry_window();
    assert_eq!(result.status, 200);
    assert!(window >= Duration::from_secs(2) && window <= Duration::from_secs(3));
    assert!(started.elapsed() >= window);
    assert_eq!(requests_to(&server, "PUT", "/api/regions/reg_1").await, 2);
}

#[tokio::test]
async fn test_membership_update_failure_does_not_stop_the_rest() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/products/prod_\d$"))
        .respond_with(updated("prod"))
        .mount(&server)
        .await;

    let store = Arc::new(FailingStore {
        broken_prefix: "prod_2_",
        ..FailingStore::default()
    });
    let engine = StrapiEngine::new(config(&server, Duration::from_secs(3)).build(), store).unwrap();
    let products: Vec<Value> = (1..=3)
        .map(|n| json!({"id": format!("prod_{n}"), "collection": {"id": "pcol_1"}}))
        .collect();

    let result = engine
        .sync()
        .update_products_within_collection(&products)
        .await
        .unwrap();

    assert_eq!(result.status, 200);
    assert_eq!(requests_to(&server, "PUT", "/api/products/prod_1").await, 1);
    assert_eq!(requests_to(&server, "PUT", "/api/products/prod_2").await, 0);
    assert_eq!(requests_to(&server, "PUT", "/api/products/prod_3").await, 1);
}

#[tokio::test]
async fn test_membership_updates_run_one_at_a_time() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/products/prod_\d$"))
        .respond_with(updated("prod").set_delay(Duration::from_millis(100)))
        .expect(5)
        .mount(&server)
        .await;

    let engine = engine(&server, Duration::from_secs(3));
    let products: Vec<Value> = (1..=5)
        .map(|n| json!({"id": format!("prod_{n}"), "collection": {"id": "pcol_1"}}))
        .collect();

    let started = Instant::now();
    engine
        .subscriber()
        .handle(
            "product-collection.products-added",
            &json!({ "products": products }),
        )
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));

    let order: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        order,
        (1..=5)
            .map(|n| format!("/api/products/prod_{n}"))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_reverse_sync_patches_only_changed_scalars() {
    let server = MockServer::start().await;
    let engine = engine(&server, Duration::from_secs(3));
    let repository = Arc::new(InMemoryRepository::new());
    repository
        .insert(
            EntityKind::Product,
            json!({
                "id": "prod_1",
                "handle": "shirt",
                "title": "Shirt",
                "subtitle": "Cotton",
                "variants": [{"id": "var_1"}],
            }),
        )
        .unwrap();

    let result = engine
        .reverse(repository.clone())
        .apply(
            EntityKind::Product,
            "prod_1",
            &json!({
                "medusa_id": "prod_1",
                "handle": "shirt",
                "title": "Linen shirt",
                "subtitle": "Cotton",
                "variants": [{"id": "var_2"}],
            }),
        )
        .await
        .unwrap();

    assert!(matches!(result, ReverseSync::Updated(_)));
    let patches = repository.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(Value::Object(patches[0].2.clone()), json!({"title": "Linen shirt"}));
    assert!(
        engine
            .ledger()
            .is_ignored("prod_1", Side::Strapi)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_unsubscribed_events_are_ignored() {
    let server = MockServer::start().await;
    let engine = engine(&server, Duration::from_secs(3));
    let result = engine
        .subscriber()
        .handle("order.placed", &json!({"id": "order_1"}))
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
}
