// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::recurrence::RecurrenceRule;
use crate::domain::models::search_spec::SearchSpecification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 定时采集任务
///
/// 一个命名的、按重复规则周期执行的搜索规格。任务由调度器独占，
/// 管理接口的修改都经由调度器串行应用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 任务名称
    pub name: String,
    /// 每次执行使用的搜索规格
    pub spec: SearchSpecification,
    /// 重复规则
    pub recurrence: RecurrenceRule,
    /// 当前状态
    pub state: JobState,
    /// 导出目标，仅作为元数据保存
    pub export_targets: Vec<ExportTarget>,
    /// 最近一次开始执行的时间
    pub last_run_at: Option<DateTime<Utc>>,
    /// 下一次计划执行时间
    pub next_run_at: DateTime<Utc>,
    /// 最近一次执行的摘要
    pub last_result: Option<JobRunSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 任务状态
///
/// 状态转换遵循以下流程：
/// Pending → Running → Succeeded/Failed → Pending
///
/// 一次性任务执行后停留在终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            _ => Err(()),
        }
    }
}

/// 导出目标
///
/// 调度器只保存该配置，不执行任何导出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportTarget {
    Csv,
    Excel,
    Json,
    GoogleSheets,
}

/// 单次执行摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRunSummary {
    /// 对应的采集运行标识
    pub run_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 产出的规范商家数量
    pub business_count: usize,
    /// 成功的平台
    #[serde(default)]
    pub succeeded_platforms: Vec<String>,
    /// 失败的平台及原因
    #[serde(default)]
    pub failed_platforms: Vec<String>,
    /// 失败原因（整体失败时）
    #[serde(default)]
    pub error: Option<String>,
}

impl JobRunSummary {
    /// 只有部分平台成功的运行
    pub fn is_degraded(&self) -> bool {
        self.error.is_none() && !self.failed_platforms.is_empty()
    }
}

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 状态转换不符合业务规则
    #[error("Invalid state transition: cannot {action} a {from} job")]
    InvalidStateTransition { from: JobState, action: &'static str },

    /// 输入数据不符合领域规则
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ScheduledJob {
    /// 创建一个新的定时任务
    ///
    /// 下一次执行时间按 `now` 之后的第一个重复时刻计算。
    pub fn new(
        name: impl Into<String>,
        spec: SearchSpecification,
        recurrence: RecurrenceRule,
        export_targets: Vec<ExportTarget>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            spec,
            next_run_at: recurrence.next_after(now),
            recurrence,
            state: JobState::Pending,
            export_targets,
            last_run_at: None,
            last_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否到期可执行
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_run_at <= now
    }

    /// 已执行完毕、不会再运行的一次性任务
    pub fn is_retired(&self) -> bool {
        self.recurrence.is_one_time() && self.state.is_terminal()
    }

    /// 开始执行
    ///
    /// 将任务状态从Pending变更为Running
    pub fn start(mut self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            JobState::Pending => {
                self.state = JobState::Running;
                self.last_run_at = Some(now);
                self.updated_at = now;
                Ok(self)
            }
            from => Err(DomainError::InvalidStateTransition {
                from,
                action: "start",
            }),
        }
    }

    /// 执行成功
    ///
    /// 将任务状态从Running变更为Succeeded，并记录执行摘要
    pub fn succeed(mut self, summary: JobRunSummary, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            JobState::Running => {
                self.state = JobState::Succeeded;
                self.last_result = Some(summary);
                self.next_run_at = self.recurrence.next_after(now);
                self.updated_at = now;
                Ok(self)
            }
            from => Err(DomainError::InvalidStateTransition {
                from,
                action: "succeed",
            }),
        }
    }

    /// 执行失败
    ///
    /// 将任务状态从Running变更为Failed，并记录执行摘要
    pub fn fail(mut self, summary: JobRunSummary, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            JobState::Running => {
                self.state = JobState::Failed;
                self.last_result = Some(summary);
                self.next_run_at = self.recurrence.next_after(now);
                self.updated_at = now;
                Ok(self)
            }
            from => Err(DomainError::InvalidStateTransition {
                from,
                action: "fail",
            }),
        }
    }

    /// 重新进入等待状态
    ///
    /// 终态任务回到Pending，下一次执行时间重新计算，保证严格晚于 `now`。
    /// 一次性任务保持终态，不再进入等待。
    pub fn reschedule(mut self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            JobState::Succeeded | JobState::Failed if self.recurrence.is_one_time() => {
                self.updated_at = now;
                Ok(self)
            }
            JobState::Succeeded | JobState::Failed => {
                self.state = JobState::Pending;
                self.next_run_at = self.recurrence.next_after(now);
                self.updated_at = now;
                Ok(self)
            }
            from => Err(DomainError::InvalidStateTransition {
                from,
                action: "reschedule",
            }),
        }
    }

    /// 跳过错过的执行
    ///
    /// 停机期间错过的执行不补跑，直接推进到下一个未来时刻。
    /// 尚未执行过的一次性任务保留原时刻，在下一次检查时执行。
    pub fn skip_missed(mut self, now: DateTime<Utc>) -> Self {
        if self.state == JobState::Pending
            && self.next_run_at <= now
            && !self.recurrence.is_one_time()
        {
            self.next_run_at = self.recurrence.next_after(now);
            self.updated_at = now;
        }
        self
    }

    /// 修改任务定义
    ///
    /// 执行中的任务不能修改。
    pub fn redefine(
        mut self,
        definition: JobDefinition,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if self.state == JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state,
                action: "update",
            });
        }
        definition.validate()?;
        self.name = definition.name;
        self.spec = definition.spec;
        self.recurrence = definition.recurrence;
        self.export_targets = definition.export_targets;
        self.next_run_at = self.recurrence.next_after(now);
        if self.state.is_terminal() {
            self.state = JobState::Pending;
        }
        self.updated_at = now;
        Ok(self)
    }
}

/// 任务定义（创建和修改时的输入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub spec: SearchSpecification,
    pub recurrence: RecurrenceRule,
    #[serde(default)]
    pub export_targets: Vec<ExportTarget>,
}

impl JobDefinition {
    pub fn validate(&self) -> Result<(), DomainError> {
        use validator::Validate;

        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "job name cannot be empty".to_string(),
            ));
        }
        self.spec
            .validate()
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;
        self.recurrence
            .validate()
            .map_err(|e| DomainError::ValidationError(e.to_string()))
    }

    pub fn into_job(self, now: DateTime<Utc>) -> Result<ScheduledJob, DomainError> {
        self.validate()?;
        Ok(ScheduledJob::new(
            self.name,
            self.spec,
            self.recurrence,
            self.export_targets,
            now,
        ))
    }
}
