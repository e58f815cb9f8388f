//! Integration tests for the orchestrator — cache-first reads, freshness via
//! `max_age`, and write-through of successful upstream results.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huginn::{CacheStore, FetchOptions, Fetcher, NoJitter, RetryPolicy, StoreConfig};

fn fetcher() -> Fetcher {
    Fetcher::new(
        RetryPolicy::new()
            .max_retries(3)
            .backoff_base(0.001)
            .backoff_jitter(0.0),
    )
    .with_jitter(Arc::new(NoJitter))
}

#[tokio::test]
async fn fresh_cache_hit_skips_the_upstream_entirely() {
    let server = MockServer::start().await;
    // expect(0): any upstream call fails the test on drop.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("from upstream")))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(StoreConfig::new()));
    store.set("jira:PROJ:issues:0", &json!("from cache"), 200).unwrap();

    let result = fetcher()
        .rate_limited_get(
            &format!("{}/issues", server.uri()),
            &FetchOptions::new()
                .cache(store, "jira:PROJ:issues:0")
                .max_age(Duration::from_secs(60)),
        )
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.response, json!("from cache"));
}

#[tokio::test]
async fn hit_without_max_age_is_always_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("upstream")))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(StoreConfig::new()));
    store.set("k", &json!("cached long ago"), 200).unwrap();
    std::thread::sleep(Duration::from_millis(30));

    let result = fetcher()
        .rate_limited_get(
            &format!("{}/any", server.uri()),
            &FetchOptions::new().cache(store, "k"),
        )
        .await;

    assert_eq!(result.response, json!("cached long ago"));
}

#[tokio::test]
async fn stale_entry_refetches_and_refreshes_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("fresh body")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(StoreConfig::new()));
    store.set("k", &json!("stale body"), 200).unwrap();
    std::thread::sleep(Duration::from_millis(60));

    let result = fetcher()
        .rate_limited_get(
            &format!("{}/issues", server.uri()),
            &FetchOptions::new()
                .cache(store.clone(), "k")
                .max_age(Duration::from_millis(20)),
        )
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.response, json!("fresh body"));
    // The upstream result replaced the stale entry.
    assert_eq!(store.get("k").unwrap().response, json!("fresh body"));
}

#[tokio::test]
async fn successful_miss_writes_through_to_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"commits": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(StoreConfig::new()));
    let result = fetcher()
        .rate_limited_get(
            &format!("{}/commits", server.uri()),
            &FetchOptions::new().cache(store.clone(), "github:repo:commits"),
        )
        .await;

    assert!(result.is_success());
    let hit = store.get("github:repo:commits").unwrap();
    assert_eq!(hit.response, json!({"commits": 42}));
    assert_eq!(hit.status, 200);
}

#[tokio::test]
async fn non_200_results_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(StoreConfig::new()));
    let result = fetcher()
        .rate_limited_get(
            &format!("{}/gone", server.uri()),
            &FetchOptions::new().cache(store.clone(), "k"),
        )
        .await;

    assert_eq!(result.status, 404);
    assert!(store.get("k").is_none());
}

#[tokio::test]
async fn second_call_is_served_from_the_write_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"page": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(StoreConfig::new()));
    let f = fetcher();
    let url = format!("{}/pages", server.uri());
    let opts = FetchOptions::new()
        .cache(store, "pages:1")
        .max_age(Duration::from_secs(60));

    let first = f.rate_limited_get(&url, &opts).await;
    let second = f.rate_limited_get(&url, &opts).await;

    assert_eq!(first.response, second.response);
    assert_eq!(second.status, 200);
}

#[tokio::test]
async fn fetch_without_cache_still_works() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("no cache involved")))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher()
        .rate_limited_get(&format!("{}/plain", server.uri()), &FetchOptions::new())
        .await;

    assert_eq!(result.response, json!("no cache involved"));
}
