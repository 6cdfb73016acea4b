// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::ScheduledJob;
use crate::domain::models::report::CollectionResult;
use crate::domain::repositories::result_sink::{ResultSink, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// 已发布的一次运行结果
#[derive(Debug, Clone, Serialize)]
pub struct PublishedResult {
    pub job_id: Uuid,
    pub job_name: String,
    pub published_at: DateTime<Utc>,
    pub result: CollectionResult,
}

/// 内存结果接收端
///
/// 每个任务只保留最近一次的结果，供管理接口查询。
#[derive(Default)]
pub struct InMemoryResultSink {
    latest: DashMap<Uuid, PublishedResult>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, job_id: Uuid) -> Option<PublishedResult> {
        self.latest.get(&job_id).map(|entry| entry.value().clone())
    }

    /// 丢弃任务的结果，任务删除时调用
    pub fn forget(&self, job_id: Uuid) {
        self.latest.remove(&job_id);
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn publish(&self, job: &ScheduledJob, result: &CollectionResult) -> Result<(), SinkError> {
        debug!(
            job_id = %job.id,
            businesses = result.businesses.len(),
            targets = ?job.export_targets,
            "Publishing collection result"
        );
        self.latest.insert(
            job.id,
            PublishedResult {
                job_id: job.id,
                job_name: job.name.clone(),
                published_at: Utc::now(),
                result: result.clone(),
            },
        );
        Ok(())
    }
}
