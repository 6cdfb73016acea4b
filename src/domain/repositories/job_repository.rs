// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::ScheduledJob;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 持久化的列无法解码
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// 定时任务仓库特质
///
/// 每次创建、更新、删除都是单条语句，对单条记录原子。
/// 写入只由调度器驱动循环发起，读取可以并发。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledJob>, RepositoryError>;
    /// 更新任务
    async fn update(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError>;
    /// 删除任务，返回是否存在
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
    /// 枚举全部任务
    async fn list(&self) -> Result<Vec<ScheduledJob>, RepositoryError>;
    /// 查找到期的等待任务
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, RepositoryError>;
}
