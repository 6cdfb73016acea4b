// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::TryStreamExt;
use listingrs::domain::models::business::RawBusinessRecord;
use listingrs::domain::models::identity::{Identity, LeaseOutcome};
use listingrs::domain::models::search_spec::SearchSpecification;
use listingrs::domain::platform::PlatformAdapter;
use listingrs::engines::fetch_coordinator::ResilientFetcher;
use listingrs::engines::http_adapter::JsonListingAdapter;
use listingrs::engines::identity_pool::{IdentityPool, PoolConfig};
use listingrs::utils::retry_policy::RetryPolicy;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGENT: &str = "listingrs-test/1.0";

fn pool() -> Arc<IdentityPool> {
    Arc::new(IdentityPool::new(
        vec![Identity::direct(AGENT)],
        PoolConfig::default(),
    ))
}

fn business(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "address": "500 Congress Ave",
        "city": "Austin",
        "state": "TX",
        "rating": 4.4,
        "review_count": 87,
        "categories": ["Coffee"]
    })
}

fn spec() -> SearchSpecification {
    SearchSpecification::new("Austin, TX", ["sidecar"]).with_keyword("coffee")
}

#[tokio::test]
async fn test_follows_next_page_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("location", "Austin, TX"))
        .and(query_param("keyword", "coffee"))
        .and(header("user-agent", AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "businesses": [business("a", "Bean There"), business("b", "Brew Haus")],
            "next": format!("{}/cursor/2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cursor/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [business("c", "Cup Club")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = JsonListingAdapter::new("sidecar", format!("{}/search", server.uri()));
    let pool = pool();
    let lease = pool.acquire().unwrap();

    let records: Vec<RawBusinessRecord> = adapter
        .search(&spec(), &lease)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    pool.release(lease, LeaseOutcome::Success);

    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Bean There", "Brew Haus", "Cup Club"]);
    assert!(records.iter().all(|r| r.platform.as_str() == "sidecar"));
    assert_eq!(records[0].address.region.as_deref(), Some("TX"));
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let pool = pool();
    let lease = pool.acquire().unwrap();

    let limited = JsonListingAdapter::new("sidecar", format!("{}/limited", server.uri()));
    let err = limited.search(&spec(), &lease).await.err().unwrap();
    assert!(err.is_retryable());

    let bad = JsonListingAdapter::new("sidecar", format!("{}/bad", server.uri()));
    let err = bad.search(&spec(), &lease).await.err().unwrap();
    assert!(!err.is_retryable());
    assert_eq!(err.reason(), "HTTP 400");

    let garbage = JsonListingAdapter::new("sidecar", format!("{}/garbage", server.uri()));
    let err = garbage.search(&spec(), &lease).await.err().unwrap();
    assert!(!err.is_retryable());

    pool.release(lease, LeaseOutcome::Success);
}

#[tokio::test]
async fn test_api_key_is_sent_as_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "businesses": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = JsonListingAdapter::new("sidecar", format!("{}/search", server.uri()))
        .with_api_key("s3cret");
    let pool = pool();
    let lease = pool.acquire().unwrap();
    let records: Vec<RawBusinessRecord> = adapter
        .search(&spec(), &lease)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    pool.release(lease, LeaseOutcome::Success);

    assert!(records.is_empty());
}

/// 服务端先返回 503，抓取协调器重试后成功
#[tokio::test]
async fn test_fetcher_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "businesses": [business("a", "Bean There")]
        })))
        .mount(&server)
        .await;

    let adapter = JsonListingAdapter::new("sidecar", format!("{}/search", server.uri()));
    let fetcher = ResilientFetcher::new(pool(), RetryPolicy::fast());

    let success = fetcher.fetch(&spec(), &adapter).await.unwrap();
    assert_eq!(success.attempts, 2);
    assert_eq!(success.records.len(), 1);

    let snapshot = fetcher.pool().snapshot();
    assert_eq!(snapshot[0].total_failures, 1);
    assert_eq!(snapshot[0].total_successes, 1);
}
