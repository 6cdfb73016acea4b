// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{coordinator, pool, setup_db, tonys_pizza, StaticAdapter};
use axum::http::StatusCode;
use axum_test::TestServer;
use listingrs::domain::platform::PlatformAdapter;
use listingrs::domain::repositories::job_repository::JobRepository;
use listingrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use listingrs::infrastructure::result_sink::InMemoryResultSink;
use listingrs::presentation::routes::{routes, AdminServices};
use listingrs::scheduler::{JobScheduler, SystemClock};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct TestApp {
    server: TestServer,
    shutdown: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn create_test_app() -> TestApp {
    let db = setup_db().await;
    let jobs: Arc<dyn JobRepository> = Arc::new(JobRepositoryImpl::new(db));
    let (google, yelp) = tonys_pizza();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(StaticAdapter::ok("google_maps", vec![google])),
        Arc::new(StaticAdapter::ok("yelp", vec![yelp])),
    ];
    let coordinator = Arc::new(coordinator(pool(3), adapters));
    let results = Arc::new(InMemoryResultSink::new());

    let (scheduler, handle) = JobScheduler::new(
        jobs.clone(),
        coordinator.clone(),
        Arc::new(SystemClock),
        Duration::from_secs(60),
    );
    let shutdown = CancellationToken::new();
    tokio::spawn(scheduler.with_sink(results.clone()).run(shutdown.clone()));

    let app = routes(AdminServices {
        jobs,
        scheduler: handle,
        coordinator,
        results,
    });
    TestApp {
        server: TestServer::new(app).unwrap(),
        shutdown,
    }
}

fn job_body(name: &str) -> Value {
    json!({
        "name": name,
        "spec": {
            "location": "New York, NY",
            "keyword": "pizza",
            "platforms": ["google_maps", "yelp"]
        },
        "recurrence": { "frequency": "daily", "time": "02:00" },
        "export_targets": ["csv"]
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_job_lifecycle_over_http() {
    let app = create_test_app().await;

    let response = app.server.post("/v1/jobs").json(&job_body("nightly")).await;
    response.assert_status(StatusCode::CREATED);
    let created = response.json::<Value>();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["state"], "pending");

    let listed = app.server.get("/v1/jobs").await.json::<Value>();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = app
        .server
        .put(&format!("/v1/jobs/{}", id))
        .json(&job_body("renamed"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["name"], "renamed");

    let fetched = app.server.get(&format!("/v1/jobs/{}", id)).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>()["name"], "renamed");

    let status = app.server.get("/v1/scheduler/status").await.json::<Value>();
    assert_eq!(status["total_jobs"], 1);
    assert_eq!(status["pending"], 1);

    let cancelled = app
        .server
        .post(&format!("/v1/jobs/{}/cancel", id))
        .await
        .json::<Value>();
    assert_eq!(cancelled["cancelled"], false);

    app.server
        .get(&format!("/v1/jobs/{}/result", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.server
        .delete(&format!("/v1/jobs/{}", id))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get(&format!("/v1/jobs/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .delete(&format!("/v1/jobs/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_job_definition_is_rejected() {
    let app = create_test_app().await;
    let response = app.server.post("/v1/jobs").json(&job_body("  ")).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"]
        .as_str()
        .unwrap()
        .contains("name"));
}

#[tokio::test]
async fn test_one_shot_collection() {
    let app = create_test_app().await;
    let response = app
        .server
        .post("/v1/collect")
        .json(&json!({
            "location": "New York, NY",
            "platforms": ["google_maps", "yelp"]
        }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let businesses = body["businesses"].as_array().unwrap();
    assert_eq!(businesses.len(), 1);
    assert_eq!(businesses[0]["sources"], json!(["google_maps", "yelp"]));
}

#[tokio::test]
async fn test_collection_without_any_usable_platform() {
    let app = create_test_app().await;
    let response = app
        .server
        .post("/v1/collect")
        .json(&json!({ "location": "New York, NY", "platforms": ["tripadvisor"] }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body = response.json::<Value>();
    assert_eq!(
        body["report"]["outcomes"]["tripadvisor"]["status"],
        "unsupported_platform"
    );
}

#[tokio::test]
async fn test_identity_health_listing() {
    let app = create_test_app().await;
    let body = app.server.get("/v1/identities").await.json::<Value>();
    assert_eq!(body["stats"]["total"], 3);
    assert_eq!(body["identities"].as_array().unwrap().len(), 3);
    assert_eq!(body["platforms"], json!(["google_maps", "yelp"]));
}
