// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::DomainError;
use crate::domain::models::report::CollectionReport;
use crate::domain::repositories::job_repository::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

/// 身份池错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// 所有身份都在冷却中
    #[error("Identity pool exhausted: all {total} identities are cooling down")]
    Exhausted { total: usize },

    /// 所有可用身份都已借出
    #[error("Identity pool busy: all {total} available identities are leased")]
    Busy { total: usize },

    /// 身份池为空
    #[error("Identity pool is empty")]
    Empty,

    /// 等待可用身份超时
    #[error("Timed out waiting for an identity")]
    Timeout,
}

/// 抓取错误类型
///
/// 瞬时错误在抓取协调器内部重试，只会以 `ExhaustedRetries` 的形式向外暴露。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 永久失败，不重试
    #[error("Permanent fetch error: {reason}")]
    Permanent { reason: String },

    /// 瞬时错误超过重试上限
    #[error("Exhausted retries after {attempts} attempts: {last_reason}")]
    ExhaustedRetries { attempts: u32, last_reason: String },

    /// 没有健康的身份可用
    #[error("Identity pool exhausted after {attempts} attempts")]
    PoolExhausted { attempts: u32 },
}

/// 采集错误类型
#[derive(Error, Debug)]
pub enum CollectionError {
    /// 搜索规格无效
    #[error("Invalid search specification: {0}")]
    InvalidSpecification(String),

    /// 所有平台都失败，没有可合并的数据
    #[error("No platform succeeded, nothing to merge")]
    MergeInputEmpty { report: Box<CollectionReport> },

    /// 采集被取消
    #[error("Collection cancelled")]
    Cancelled { report: Box<CollectionReport> },
}

impl CollectionError {
    /// 失败时的平台报告
    pub fn report(&self) -> Option<&CollectionReport> {
        match self {
            CollectionError::MergeInputEmpty { report } | CollectionError::Cancelled { report } => {
                Some(report)
            }
            CollectionError::InvalidSpecification(_) => None,
        }
    }
}

/// 调度器错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// 任务存储写入失败
    #[error("Scheduler persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    /// 状态转换或校验失败
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// 任务正在执行
    #[error("Job {0} is running")]
    JobRunning(Uuid),

    /// 调度器已停止
    #[error("Scheduler is not running")]
    Unavailable,
}
