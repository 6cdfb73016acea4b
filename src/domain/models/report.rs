// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::business::CanonicalBusinessRecord;
use crate::domain::models::search_spec::PlatformId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 单个平台在一次采集中的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlatformOutcome {
    /// 抓取成功
    Succeeded {
        /// 适配器返回的原始记录数
        fetched: usize,
        /// 清洗和过滤后进入合并的记录数
        accepted: usize,
        /// 使用的尝试次数
        attempts: u32,
    },
    /// 永久失败，未重试
    PermanentFailure { reason: String },
    /// 瞬时错误持续到重试上限
    ExhaustedRetries { attempts: u32, last_reason: String },
    /// 没有可用的健康身份
    PoolExhausted { attempts: u32 },
    /// 平台未注册适配器
    UnsupportedPlatform,
    /// 采集被取消，未派发
    Cancelled,
    /// 抓取任务异常终止
    Aborted { reason: String },
}

impl PlatformOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PlatformOutcome::Succeeded { .. })
    }

    /// 用于日志和指标的简短标签
    pub fn label(&self) -> &'static str {
        match self {
            PlatformOutcome::Succeeded { .. } => "succeeded",
            PlatformOutcome::PermanentFailure { .. } => "permanent_failure",
            PlatformOutcome::ExhaustedRetries { .. } => "exhausted_retries",
            PlatformOutcome::PoolExhausted { .. } => "pool_exhausted",
            PlatformOutcome::UnsupportedPlatform => "unsupported_platform",
            PlatformOutcome::Cancelled => "cancelled",
            PlatformOutcome::Aborted { .. } => "aborted",
        }
    }

    /// 失败原因描述，成功时为 `None`
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            PlatformOutcome::Succeeded { .. } => None,
            PlatformOutcome::PermanentFailure { reason } => Some(format!("permanent: {}", reason)),
            PlatformOutcome::ExhaustedRetries {
                attempts,
                last_reason,
            } => Some(format!(
                "exhausted retries after {} attempts: {}",
                attempts, last_reason
            )),
            PlatformOutcome::PoolExhausted { attempts } => Some(format!(
                "identity pool exhausted after {} attempts",
                attempts
            )),
            PlatformOutcome::UnsupportedPlatform => Some("no adapter registered".to_string()),
            PlatformOutcome::Cancelled => Some("cancelled".to_string()),
            PlatformOutcome::Aborted { reason } => Some(format!("aborted: {}", reason)),
        }
    }
}

/// 采集报告
///
/// 每个平台一条结果，顺序无意义（按平台标识排序以保证输出稳定）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: BTreeMap<PlatformId, PlatformOutcome>,
    /// 进入合并的原始记录总数
    pub raw_record_count: usize,
    /// 合并后的规范记录数
    pub canonical_count: usize,
}

impl CollectionReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            outcomes: BTreeMap::new(),
            raw_record_count: 0,
            canonical_count: 0,
        }
    }

    pub fn succeeded_platforms(&self) -> Vec<PlatformId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(platform, _)| platform.clone())
            .collect()
    }

    pub fn failed_platforms(&self) -> Vec<(PlatformId, String)> {
        self.outcomes
            .iter()
            .filter_map(|(platform, outcome)| {
                outcome
                    .failure_reason()
                    .map(|reason| (platform.clone(), reason))
            })
            .collect()
    }

    /// 部分平台失败
    pub fn is_degraded(&self) -> bool {
        self.outcomes.values().any(|o| !o.is_success())
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.values().any(PlatformOutcome::is_success)
    }
}

/// 一次采集的完整结果，交给导出端的唯一产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub run_id: Uuid,
    pub businesses: Vec<CanonicalBusinessRecord>,
    pub report: CollectionReport,
}
