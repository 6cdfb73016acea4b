// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::setup_db;
use chrono::{DateTime, TimeZone, Utc};
use listingrs::domain::models::job::{ExportTarget, JobRunSummary, JobState, ScheduledJob};
use listingrs::domain::models::recurrence::{RecurrenceRule, TimeOfDay};
use listingrs::domain::models::search_spec::SearchSpecification;
use listingrs::domain::repositories::job_repository::{JobRepository, RepositoryError};
use listingrs::infrastructure::database::entities::scheduled_job as job_entity;
use listingrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use uuid::Uuid;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn job(name: &str, hour: u32, now: DateTime<Utc>) -> ScheduledJob {
    ScheduledJob::new(
        name,
        SearchSpecification::new("Seattle, WA", ["google_maps", "yelp"])
            .with_category("coffee")
            .with_min_rating(4.0),
        RecurrenceRule::daily(TimeOfDay::new(hour, 0).unwrap()),
        vec![ExportTarget::Csv, ExportTarget::GoogleSheets],
        now,
    )
}

#[tokio::test]
async fn test_job_round_trips_through_database() {
    let repo = JobRepositoryImpl::new(setup_db().await);
    let created = job("coffee", 2, at(10, 1));
    repo.create(&created).await.unwrap();

    let found = repo.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(found, created);

    let started = found.start(at(10, 2)).unwrap();
    let summary = JobRunSummary {
        run_id: Some(Uuid::new_v4()),
        started_at: at(10, 2),
        finished_at: at(10, 3),
        business_count: 42,
        succeeded_platforms: vec!["google_maps".to_string()],
        failed_platforms: vec!["yelp: HTTP 429".to_string()],
        error: None,
    };
    let finished = started.succeed(summary.clone(), at(10, 3)).unwrap();
    repo.update(&finished).await.unwrap();

    let found = repo.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(found.state, JobState::Succeeded);
    assert_eq!(found.last_result, Some(summary));
    assert_eq!(found.last_run_at, Some(at(10, 2)));
}

#[tokio::test]
async fn test_find_due_returns_only_pending_jobs_past_their_time() {
    let repo = JobRepositoryImpl::new(setup_db().await);
    let early = job("early", 2, at(10, 1));
    let late = job("late", 8, at(10, 1));
    let running = job("running", 3, at(10, 1)).start(at(10, 3)).unwrap();
    for j in [&early, &late, &running] {
        repo.create(j).await.unwrap();
    }

    let due = repo.find_due(at(10, 5)).await.unwrap();
    assert_eq!(due.iter().map(|j| j.id).collect::<Vec<_>>(), vec![early.id]);

    let due = repo.find_due(at(10, 9)).await.unwrap();
    assert_eq!(
        due.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![early.id, late.id]
    );
}

#[tokio::test]
async fn test_update_and_delete_missing_job() {
    let repo = JobRepositoryImpl::new(setup_db().await);
    let ghost = job("ghost", 2, at(10, 1));

    assert!(matches!(
        repo.update(&ghost).await,
        Err(RepositoryError::NotFound)
    ));
    assert!(!repo.delete(ghost.id).await.unwrap());

    repo.create(&ghost).await.unwrap();
    assert!(repo.delete(ghost.id).await.unwrap());
    assert!(repo.find_by_id(ghost.id).await.unwrap().is_none());
    assert!(repo.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_row_is_reported() {
    let db = setup_db().await;
    let repo = JobRepositoryImpl::new(db.clone());
    let stored = job("broken", 2, at(10, 1));
    repo.create(&stored).await.unwrap();

    let row = job_entity::Entity::find_by_id(stored.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let mut active: job_entity::ActiveModel = row.into();
    active.state = Set("exploded".to_string());
    active.update(db.as_ref()).await.unwrap();

    assert!(matches!(
        repo.find_by_id(stored.id).await,
        Err(RepositoryError::Corrupt { id, .. }) if id == stored.id
    ));
}
