// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 搜索规格（search_spec）：一次采集要收集的内容
/// - 商家记录（business）：平台原始记录与合并后的规范记录
/// - 网络身份（identity）：代理出口与 User-Agent 组成的可轮换身份
/// - 采集报告（report）：每个平台的结果与整体采集产物
/// - 定时任务（job）与重复规则（recurrence）
pub mod business;
pub mod identity;
pub mod job;
pub mod recurrence;
pub mod report;
pub mod search_spec;

pub use business::{
    Address, CanonicalBusinessRecord, GeoPoint, PlatformStats, RawBusinessRecord, SourceListing,
};
pub use identity::{
    Identity, IdentityHealth, IdentityLease, IdentitySnapshot, LeaseOutcome, PoolStats,
    ProxyEndpoint,
};
pub use job::{DomainError, ExportTarget, JobDefinition, JobRunSummary, JobState, ScheduledJob};
pub use recurrence::{Frequency, RecurrenceError, RecurrenceRule, TimeOfDay};
pub use report::{CollectionReport, CollectionResult, PlatformOutcome};
pub use search_spec::{PlatformId, SearchSpecification};
