// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// 代理出口
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// 协议 (http, https, socks5)
    pub scheme: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// 可直接交给 HTTP 客户端使用的代理 URL（包含凭据）
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}:{}", self.scheme, user, pass, self.host, self.port)
            }
            (Some(user), None) => format!("{}://{}@{}:{}", self.scheme, user, self.host, self.port),
            _ => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    /// 日志输出时不暴露密码
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// 网络出口身份：代理出口 + User-Agent
///
/// `proxy` 为空表示直连。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub proxy: Option<ProxyEndpoint>,
    pub user_agent: String,
}

impl Identity {
    pub fn direct(user_agent: impl Into<String>) -> Self {
        Self {
            proxy: None,
            user_agent: user_agent.into(),
        }
    }

    pub fn via(proxy: ProxyEndpoint, user_agent: impl Into<String>) -> Self {
        Self {
            proxy: Some(proxy),
            user_agent: user_agent.into(),
        }
    }

    /// 用于日志和统计的标签
    pub fn label(&self) -> String {
        match &self.proxy {
            Some(proxy) => proxy.to_string(),
            None => "direct".to_string(),
        }
    }
}

/// 身份健康状态
///
/// 状态转换：Healthy → Degraded（出现连续失败）→ CoolingDown（达到阈值，计时）
/// → Healthy（冷却到期后乐观恢复）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityHealth {
    Healthy,
    Degraded,
    CoolingDown,
}

impl fmt::Display for IdentityHealth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdentityHealth::Healthy => write!(f, "healthy"),
            IdentityHealth::Degraded => write!(f, "degraded"),
            IdentityHealth::CoolingDown => write!(f, "cooling_down"),
        }
    }
}

/// 一次抓取尝试的结果，用于归还租约
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    Success,
    Failure,
}

/// 接收归还租约的一方，由身份池实现
pub trait LeaseReturn: Send + Sync {
    fn return_slot(&self, slot: usize, outcome: LeaseOutcome);
}

/// 身份租约
///
/// 在一次抓取尝试期间借出的身份。租约不可克隆，
/// 归还时 `IdentityPool::release` 会消费它。
/// 未经归还就被丢弃的租约（任务被中止或发生 panic）按失败自动归还。
#[derive(Debug)]
pub struct IdentityLease {
    pub(crate) slot: usize,
    identity: Arc<Identity>,
    health: IdentityHealth,
    owner: Weak<dyn LeaseReturn>,
    returned: bool,
}

impl IdentityLease {
    pub(crate) fn new(
        slot: usize,
        identity: Arc<Identity>,
        health: IdentityHealth,
        owner: Weak<dyn LeaseReturn>,
    ) -> Self {
        Self {
            slot,
            identity,
            health,
            owner,
            returned: false,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.identity.proxy.as_ref()
    }

    pub fn user_agent(&self) -> &str {
        &self.identity.user_agent
    }

    /// 借出时的健康状态
    pub fn health(&self) -> IdentityHealth {
        self.health
    }

    /// 是否由 `owner` 借出
    pub(crate) fn is_owned_by<T: LeaseReturn>(&self, owner: &Arc<T>) -> bool {
        std::ptr::addr_eq(self.owner.as_ptr(), Arc::as_ptr(owner))
    }

    /// 归还并消费租约
    pub(crate) fn complete(mut self, outcome: LeaseOutcome) {
        self.hand_back(outcome);
    }

    fn hand_back(&mut self, outcome: LeaseOutcome) {
        if self.returned {
            return;
        }
        self.returned = true;
        // 身份池已经释放时无处归还
        if let Some(owner) = self.owner.upgrade() {
            owner.return_slot(self.slot, outcome);
        }
    }
}

impl Drop for IdentityLease {
    fn drop(&mut self) {
        if !self.returned {
            warn!(
                identity = %self.identity.label(),
                "Identity lease dropped without release, returning it as failed"
            );
            self.hand_back(LeaseOutcome::Failure);
        }
    }
}

/// 单个身份的健康统计
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySnapshot {
    pub slot: usize,
    pub label: String,
    pub user_agent: String,
    pub health: IdentityHealth,
    pub leased: bool,
    pub failure_streak: u32,
    pub times_acquired: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub cooldown_remaining_ms: Option<u64>,
}

/// 身份池整体统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub cooling_down: usize,
    pub leased: usize,
}
