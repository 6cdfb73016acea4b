// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::ScheduledJob;
use crate::domain::models::report::CollectionResult;
use async_trait::async_trait;
use thiserror::Error;

/// 结果接收端错误类型
#[derive(Error, Debug)]
pub enum SinkError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 其他错误
    #[error("Sink error: {0}")]
    Other(String),
}

/// 采集结果接收端
///
/// 定时任务每次运行成功后，调度器把规范商家集合和报告交给接收端。
/// 导出格式由实现方决定。
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// 发布一次运行的结果
    async fn publish(&self, job: &ScheduledJob, result: &CollectionResult) -> Result<(), SinkError>;
}
