// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 性能基准测试套件
//!
//! 合并去重引擎和任务存储的性能基准。

use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use listingrs::domain::models::business::RawBusinessRecord;
use listingrs::domain::models::job::ScheduledJob;
use listingrs::domain::models::recurrence::{RecurrenceRule, TimeOfDay};
use listingrs::domain::models::search_spec::{PlatformId, SearchSpecification};
use listingrs::domain::repositories::job_repository::JobRepository;
use listingrs::domain::services::merge_engine::MergeEngine;
use listingrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, DbErr};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// 创建测试数据库连接并运行迁移
async fn create_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// 两个平台各 `size` 条记录，约一半是跨平台重复
fn platform_input(size: usize) -> BTreeMap<PlatformId, Vec<RawBusinessRecord>> {
    let mut google = Vec::with_capacity(size);
    let mut yelp = Vec::with_capacity(size);
    for i in 0..size {
        let lat = 41.80 + (i / 40) as f64 * 0.01;
        let lon = -87.70 + (i % 40) as f64 * 0.01;
        google.push(
            RawBusinessRecord::new("google_maps", format!("g-{}", i), format!("Venue {} Cafe", i))
                .with_street(format!("{} State St", 100 + i))
                .with_city("Chicago")
                .with_location(lat, lon)
                .with_rating(4.2, 40 + i as u32),
        );
        let name = if i % 2 == 0 {
            format!("Venue {} Cafe", i)
        } else {
            format!("Other Place {}", i)
        };
        yelp.push(
            RawBusinessRecord::new("yelp", format!("y-{}", i), name)
                .with_street(format!("{} State Street", 100 + i))
                .with_city("Chicago")
                .with_location(lat + 0.0002, lon)
                .with_rating(4.0, 10 + i as u32),
        );
    }
    BTreeMap::from([
        (PlatformId::new("google_maps"), google),
        (PlatformId::new("yelp"), yelp),
    ])
}

/// 基准测试：多平台合并去重
fn benchmark_merge(c: &mut Criterion) {
    let engine = MergeEngine::default();
    let mut group = c.benchmark_group("merge");

    for size in [50, 200, 800].iter() {
        let input = platform_input(*size);
        group.bench_with_input(BenchmarkId::new("two_platforms", size), size, |b, _| {
            b.iter(|| black_box(engine.merge(input.clone())))
        });
    }

    group.finish();
}

/// 基准测试：查找到期任务
fn benchmark_find_due(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let db = rt
        .block_on(create_test_db())
        .expect("Failed to setup test database");
    let repo = JobRepositoryImpl::new(Arc::new(db));
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    rt.block_on(async {
        for i in 0..500u32 {
            let job = ScheduledJob::new(
                format!("job-{}", i),
                SearchSpecification::new("Chicago, IL", ["google_maps", "yelp"]),
                RecurrenceRule::daily(TimeOfDay::new(i % 24, 0).unwrap()),
                Vec::new(),
                start,
            );
            repo.create(&job).await.unwrap();
        }
    });

    let now = start + Duration::hours(12);
    c.bench_function("job_repository_find_due", |b| {
        b.iter(|| rt.block_on(async { black_box(repo.find_due(now).await.unwrap()) }))
    });
}

criterion_group!(benches, benchmark_merge, benchmark_find_due);
criterion_main!(benches);
