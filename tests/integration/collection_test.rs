// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{coordinator, distinct_records, pool, tonys_pizza, StaticAdapter};
use listingrs::domain::models::identity::LeaseOutcome;
use listingrs::domain::models::report::PlatformOutcome;
use listingrs::domain::models::search_spec::{PlatformId, SearchSpecification};
use listingrs::domain::platform::{AdapterError, PlatformAdapter};
use listingrs::engines::identity_pool::{IdentityPool, PoolConfig};
use listingrs::utils::errors::{CollectionError, PoolError};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// 两个平台上的同一家店合并为一条规范记录
#[tokio::test(start_paused = true)]
async fn test_same_business_on_two_platforms_is_merged() {
    let (google, yelp) = tonys_pizza();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(StaticAdapter::ok("google_maps", vec![google])),
        Arc::new(StaticAdapter::ok("yelp", vec![yelp])),
    ];
    let coordinator = coordinator(pool(3), adapters);
    let spec = SearchSpecification::new("New York, NY", ["google_maps", "yelp"]);

    let result = coordinator.collect(&spec).await.unwrap();

    assert_eq!(result.businesses.len(), 1);
    let business = &result.businesses[0];
    assert_eq!(
        business.sources,
        BTreeSet::from([PlatformId::new("google_maps"), PlatformId::new("yelp")])
    );
    // 优先平台的名称胜出，缺失的电话从另一个平台补齐
    assert_eq!(business.name, "Tony's Pizza");
    assert!(business.phone.is_some());
    assert_eq!(result.report.raw_record_count, 2);
    assert_eq!(result.report.canonical_count, 1);
    assert!(!result.report.is_degraded());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_on_one_platform_degrades_run() {
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(StaticAdapter::ok("google_maps", distinct_records("google_maps", 10))),
        Arc::new(StaticAdapter::failing(
            "yelp",
            AdapterError::permanent("location not supported"),
        )),
    ];
    let coordinator = coordinator(pool(3), adapters);
    let spec = SearchSpecification::new("Portland, OR", ["google_maps", "yelp"]);

    let result = coordinator.collect(&spec).await.unwrap();

    assert_eq!(result.businesses.len(), 10);
    assert!(matches!(
        result.report.outcomes[&PlatformId::new("yelp")],
        PlatformOutcome::PermanentFailure { .. }
    ));
    assert_eq!(
        result.report.succeeded_platforms(),
        vec![PlatformId::new("google_maps")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_up_to_limit() {
    let failing = StaticAdapter::failing("yelp", AdapterError::transient("HTTP 503"));
    let calls = failing.calls();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(failing),
        Arc::new(StaticAdapter::ok("google_maps", distinct_records("google_maps", 2))),
    ];
    let coordinator = coordinator(pool(5), adapters);
    let spec = SearchSpecification::new("Portland, OR", ["google_maps", "yelp"]);

    let result = coordinator.collect(&spec).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        result.report.outcomes[&PlatformId::new("yelp")],
        PlatformOutcome::ExhaustedRetries {
            attempts: 3,
            last_reason: "HTTP 503".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_every_platform_failing_returns_merge_input_empty() {
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(StaticAdapter::failing("google_maps", AdapterError::permanent("HTTP 400"))),
        Arc::new(StaticAdapter::failing("yelp", AdapterError::permanent("HTTP 404"))),
    ];
    let coordinator = coordinator(pool(2), adapters);
    let spec = SearchSpecification::new("Portland, OR", ["google_maps", "yelp"]);

    let err = coordinator.collect(&spec).await.unwrap_err();
    assert!(matches!(err, CollectionError::MergeInputEmpty { .. }));
    assert_eq!(err.report().unwrap().failed_platforms().len(), 2);
}

/// 所有身份都在冷却时立即失败而不是无限等待
#[tokio::test(start_paused = true)]
async fn test_all_identities_cooling_down_fails_fast() {
    let config = PoolConfig {
        failure_threshold: 1,
        cooldown: Duration::from_secs(600),
        max_cooldown: Duration::from_secs(600),
    };
    let pool = Arc::new(IdentityPool::new(super::helpers::identities(5), config));
    for _ in 0..5 {
        let lease = pool.acquire().unwrap();
        pool.release(lease, LeaseOutcome::Failure);
    }

    assert_eq!(pool.acquire().unwrap_err(), PoolError::Exhausted { total: 5 });
    assert_eq!(
        pool.acquire_wait(Duration::from_secs(60)).await.unwrap_err(),
        PoolError::Exhausted { total: 5 }
    );

    let adapter = StaticAdapter::ok("google_maps", distinct_records("google_maps", 1));
    let calls = adapter.calls();
    let coordinator = coordinator(pool, vec![Arc::new(adapter)]);
    let spec = SearchSpecification::new("Portland, OR", ["google_maps"]);

    let err = coordinator.collect(&spec).await.unwrap_err();
    let report = err.report().unwrap();
    assert!(matches!(
        report.outcomes[&PlatformId::new("google_maps")],
        PlatformOutcome::PoolExhausted { .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_collection_is_deterministic() {
    let (google, yelp) = tonys_pizza();
    let mut google_records = distinct_records("google_maps", 5);
    google_records.push(google);
    let mut yelp_records = distinct_records("yelp", 5);
    yelp_records.push(yelp);
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![
        Arc::new(StaticAdapter::ok("google_maps", google_records)),
        Arc::new(StaticAdapter::ok("yelp", yelp_records)),
    ];
    let coordinator = coordinator(pool(4), adapters);
    let spec = SearchSpecification::new("Portland, OR", ["google_maps", "yelp"]);

    let first = coordinator.collect(&spec).await.unwrap();
    let second = coordinator.collect(&spec).await.unwrap();

    // 两个平台的 distinct_records 名称与地址相同，逐条合并
    assert_eq!(first.businesses.len(), 6);
    let ids = |r: &listingrs::domain::models::report::CollectionResult| {
        r.businesses.iter().map(|b| b.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}
