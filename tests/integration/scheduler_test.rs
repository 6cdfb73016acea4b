// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{coordinator, distinct_records, pool, setup_db, StaticAdapter};
use chrono::{DateTime, TimeZone, Utc};
use listingrs::domain::models::job::{ExportTarget, JobDefinition, JobState, ScheduledJob};
use listingrs::domain::models::recurrence::{RecurrenceRule, TimeOfDay};
use listingrs::domain::models::search_spec::SearchSpecification;
use listingrs::domain::platform::{AdapterError, PlatformAdapter};
use listingrs::domain::repositories::job_repository::JobRepository;
use listingrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use listingrs::infrastructure::result_sink::InMemoryResultSink;
use listingrs::scheduler::{JobScheduler, ManualClock};
use std::sync::Arc;
use std::time::Duration;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
}

fn nightly() -> JobDefinition {
    JobDefinition {
        name: "portland nightly".to_string(),
        spec: SearchSpecification::new("Portland, OR", ["google_maps", "yelp"]),
        recurrence: RecurrenceRule::daily(TimeOfDay::new(2, 0).unwrap()),
        export_targets: vec![ExportTarget::Json],
    }
}

fn adapters() -> Vec<Arc<dyn PlatformAdapter>> {
    vec![
        Arc::new(StaticAdapter::ok("google_maps", distinct_records("google_maps", 10))),
        Arc::new(StaticAdapter::failing(
            "yelp",
            AdapterError::permanent("HTTP 400"),
        )),
    ]
}

/// 定时任务经由真实采集和数据库完成一次运行
#[tokio::test]
async fn test_scheduled_run_persists_summary_and_publishes_result() {
    let db = setup_db().await;
    let repo = Arc::new(JobRepositoryImpl::new(db));
    let clock = Arc::new(ManualClock::new(at(10, 1, 0)));
    let sink = Arc::new(InMemoryResultSink::new());
    let runner = Arc::new(coordinator(pool(3), adapters()));

    let (scheduler, _handle) = JobScheduler::new(
        repo.clone(),
        runner,
        clock.clone(),
        Duration::from_secs(3600),
    );
    let mut scheduler = scheduler.with_sink(sink.clone());

    let job = scheduler.create_job(nightly()).await.unwrap();
    assert_eq!(job.next_run_at, at(10, 2, 0));

    clock.set(at(10, 2, 1));
    assert_eq!(scheduler.tick().await.unwrap(), 1);
    scheduler.settle().await.unwrap();

    let stored = repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Pending);
    assert_eq!(stored.last_run_at, Some(at(10, 2, 1)));
    assert_eq!(stored.next_run_at, at(11, 2, 0));
    assert_eq!(stored.export_targets, vec![ExportTarget::Json]);

    let summary = stored.last_result.unwrap();
    assert_eq!(summary.business_count, 10);
    assert_eq!(summary.succeeded_platforms, vec!["google_maps".to_string()]);
    assert_eq!(summary.failed_platforms.len(), 1);
    assert!(summary.failed_platforms[0].starts_with("yelp: "));
    assert!(summary.error.is_none());

    let published = sink.latest(job.id).unwrap();
    assert_eq!(published.result.businesses.len(), 10);

    // 同一时刻再次检查不会重复执行
    assert_eq!(scheduler.tick().await.unwrap(), 0);
}

/// 重启后恢复中断的任务，不补跑错过的时刻
#[tokio::test]
async fn test_restart_recovers_interrupted_and_missed_jobs() {
    let db = setup_db().await;
    let repo = Arc::new(JobRepositoryImpl::new(db));

    let interrupted = nightly()
        .into_job(at(9, 12, 0))
        .unwrap()
        .start(at(10, 2, 0))
        .unwrap();
    repo.create(&interrupted).await.unwrap();

    let missed = ScheduledJob::new(
        "missed",
        SearchSpecification::new("Portland, OR", ["google_maps"]),
        RecurrenceRule::daily(TimeOfDay::new(3, 30).unwrap()),
        Vec::new(),
        at(8, 12, 0),
    );
    assert_eq!(missed.next_run_at, at(9, 3, 30));
    repo.create(&missed).await.unwrap();

    let clock = Arc::new(ManualClock::new(at(10, 6, 0)));
    let (mut scheduler, _handle) = JobScheduler::new(
        repo.clone(),
        Arc::new(coordinator(pool(2), adapters())),
        clock,
        Duration::from_secs(3600),
    );

    assert_eq!(scheduler.recover().await.unwrap(), 2);

    let interrupted = repo.find_by_id(interrupted.id).await.unwrap().unwrap();
    assert_eq!(interrupted.state, JobState::Pending);
    assert_eq!(interrupted.next_run_at, at(11, 2, 0));
    assert!(interrupted
        .last_result
        .unwrap()
        .error
        .unwrap()
        .contains("interrupted"));

    let missed = repo.find_by_id(missed.id).await.unwrap().unwrap();
    assert_eq!(missed.state, JobState::Pending);
    assert_eq!(missed.next_run_at, at(11, 3, 30));
    assert!(missed.last_run_at.is_none());

    assert_eq!(scheduler.tick().await.unwrap(), 0);
}
