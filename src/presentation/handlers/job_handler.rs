// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{JobDefinition, ScheduledJob};
use crate::domain::repositories::job_repository::JobRepository;
use crate::infrastructure::result_sink::{InMemoryResultSink, PublishedResult};
use crate::presentation::errors::AppError;
use crate::scheduler::{SchedulerHandle, SchedulerStatus};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 列出全部定时任务
pub async fn list_jobs(
    Extension(repo): Extension<Arc<dyn JobRepository>>,
) -> Result<Json<Vec<ScheduledJob>>, AppError> {
    Ok(Json(repo.list().await?))
}

/// 创建定时任务
pub async fn create_job(
    Extension(scheduler): Extension<SchedulerHandle>,
    Json(definition): Json<JobDefinition>,
) -> Result<(StatusCode, Json<ScheduledJob>), AppError> {
    let job = scheduler.create(definition).await?;
    info!(job_id = %job.id, name = %job.name, "Scheduled job created via API");
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    Extension(repo): Extension<Arc<dyn JobRepository>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledJob>, AppError> {
    repo.find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Job {}", id)))
}

/// 替换任务定义，运行中的任务不能修改
pub async fn update_job(
    Extension(scheduler): Extension<SchedulerHandle>,
    Path(id): Path<Uuid>,
    Json(definition): Json<JobDefinition>,
) -> Result<Json<ScheduledJob>, AppError> {
    Ok(Json(scheduler.update(id, definition).await?))
}

pub async fn delete_job(
    Extension(scheduler): Extension<SchedulerHandle>,
    Extension(sink): Extension<Arc<InMemoryResultSink>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    scheduler.delete(id).await?;
    sink.forget(id);
    info!(job_id = %id, "Scheduled job deleted via API");
    Ok(StatusCode::NO_CONTENT)
}

/// 取消任务当前的运行
pub async fn cancel_job(
    Extension(scheduler): Extension<SchedulerHandle>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = scheduler.cancel(id).await?;
    Ok(Json(json!({ "id": id, "cancelled": cancelled })))
}

/// 任务最近一次成功运行的结果
pub async fn get_job_result(
    Extension(sink): Extension<Arc<InMemoryResultSink>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublishedResult>, AppError> {
    sink.latest(id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Result for job {}", id)))
}

pub async fn scheduler_status(
    Extension(scheduler): Extension<SchedulerHandle>,
) -> Result<Json<SchedulerStatus>, AppError> {
    Ok(Json(scheduler.status().await?))
}
