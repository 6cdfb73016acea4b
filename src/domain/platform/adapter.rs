// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::business::RawBusinessRecord;
use crate::domain::models::identity::IdentityLease;
use crate::domain::models::search_spec::{PlatformId, SearchSpecification};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// 适配器错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// 瞬时错误（限流、被封禁、超时），可重试
    #[error("Transient error: {reason}")]
    Transient { reason: String },
    /// 永久错误（查询无效、平台不支持该输入），不可重试
    #[error("Permanent error: {reason}")]
    Permanent { reason: String },
}

impl AdapterError {
    pub fn transient(reason: impl Into<String>) -> Self {
        AdapterError::Transient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        AdapterError::Permanent {
            reason: reason.into(),
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Transient { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            AdapterError::Transient { reason } | AdapterError::Permanent { reason } => reason,
        }
    }
}

/// 惰性的原始记录序列
///
/// 序列中途出现的错误与调用时的错误按同样方式分类。
pub type RecordStream = BoxStream<'static, Result<RawBusinessRecord, AdapterError>>;

/// 平台适配器特质
///
/// 给定搜索规格和一个身份租约，返回单个平台的原始商家记录。
/// 实现方负责页面或接口解析，必须通过租约中的代理和 User-Agent 发出请求。
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// 平台标识
    fn id(&self) -> PlatformId;

    /// 执行搜索
    async fn search(
        &self,
        spec: &SearchSpecification,
        lease: &IdentityLease,
    ) -> Result<RecordStream, AdapterError>;
}
