// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use futures::stream;
use listingrs::config::settings::DatabaseSettings;
use listingrs::domain::models::business::RawBusinessRecord;
use listingrs::domain::models::identity::{Identity, IdentityLease};
use listingrs::domain::models::search_spec::{PlatformId, SearchSpecification};
use listingrs::domain::platform::{AdapterError, PlatformAdapter, RecordStream};
use listingrs::domain::services::merge_engine::MergeEngine;
use listingrs::engines::collection::CollectionCoordinator;
use listingrs::engines::fetch_coordinator::ResilientFetcher;
use listingrs::engines::identity_pool::{IdentityPool, PoolConfig};
use listingrs::infrastructure::database::connection;
use listingrs::utils::retry_policy::RetryPolicy;
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 创建已迁移的内存数据库
///
/// 内存库只存在于单个连接中，连接池固定为一个连接。
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
        min_connections: Some(1),
        connect_timeout: Some(5),
        idle_timeout: None,
    };
    let db = connection::create_pool(&settings)
        .await
        .expect("Failed to connect to sqlite");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    Arc::new(db)
}

/// 返回固定结果的平台适配器
pub struct StaticAdapter {
    id: PlatformId,
    result: Result<Vec<RawBusinessRecord>, AdapterError>,
    calls: Arc<AtomicUsize>,
}

impl StaticAdapter {
    pub fn ok(id: &str, records: Vec<RawBusinessRecord>) -> Self {
        Self {
            id: PlatformId::new(id),
            result: Ok(records),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(id: &str, error: AdapterError) -> Self {
        Self {
            id: PlatformId::new(id),
            result: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl PlatformAdapter for StaticAdapter {
    fn id(&self) -> PlatformId {
        self.id.clone()
    }

    async fn search(
        &self,
        _spec: &SearchSpecification,
        _lease: &IdentityLease,
    ) -> Result<RecordStream, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let records = self.result.clone()?;
        Ok(Box::pin(stream::iter(records.into_iter().map(Ok))))
    }
}

pub fn identities(count: usize) -> Vec<Identity> {
    (0..count)
        .map(|i| Identity::direct(format!("test-agent/{}", i)))
        .collect()
}

pub fn pool(count: usize) -> Arc<IdentityPool> {
    Arc::new(IdentityPool::new(identities(count), PoolConfig::default()))
}

/// 使用快速重试策略的采集协调器
pub fn coordinator(
    pool: Arc<IdentityPool>,
    adapters: Vec<Arc<dyn PlatformAdapter>>,
) -> CollectionCoordinator {
    let fetcher = Arc::new(
        ResilientFetcher::new(pool, RetryPolicy::fast())
            .with_fetch_timeout(Duration::from_secs(30)),
    );
    let mut coordinator = CollectionCoordinator::new(fetcher, MergeEngine::default(), 2);
    for adapter in adapters {
        coordinator.register(adapter);
    }
    coordinator
}

/// 两个平台上的同一家店，写法不同，坐标相距约 40 米
pub fn tonys_pizza() -> (RawBusinessRecord, RawBusinessRecord) {
    let google = RawBusinessRecord::new("google_maps", "g-tonys", "Tony's Pizza")
        .with_street("123 Main St")
        .with_city("New York")
        .with_location(40.712800, -74.006000)
        .with_rating(4.6, 320)
        .with_categories(["Pizza"]);
    let yelp = RawBusinessRecord::new("yelp", "y-tonys", "Tonys Pizza")
        .with_street("123 Main Street")
        .with_city("New York")
        .with_location(40.713160, -74.006000)
        .with_rating(4.0, 110)
        .with_phone("212-555-0100")
        .with_categories(["Pizza", "Italian"]);
    (google, yelp)
}

/// 同一城市中互不重复的商家
pub fn distinct_records(platform: &str, count: usize) -> Vec<RawBusinessRecord> {
    let names = [
        "Alder Books",
        "Birch Hardware",
        "Cedar Bakery",
        "Dogwood Florist",
        "Elm Street Barber",
        "Fir Tree Yoga",
        "Ginkgo Tea House",
        "Hemlock Bikes",
        "Ironwood Grill",
        "Juniper Pharmacy",
        "Kapok Kids",
        "Larch Laundromat",
    ];
    (0..count)
        .map(|i| {
            RawBusinessRecord::new(
                platform,
                format!("{}-{}", platform, i),
                names[i % names.len()],
            )
            .with_street(format!("{} Oak Ave", 100 + i * 10))
            .with_city("Portland")
            .with_location(45.50 + i as f64 * 0.02, -122.65)
        })
        .collect()
}
