// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 重试策略配置
///
/// 第 n 次失败后的等待时间为 `initial_backoff × 2^(n-1)`，再加上
/// `[0, jitter_factor]` 比例的随机抖动，最后截断到 `max_backoff`。
/// 抖动只向上且不超过一倍，所以同一次抓取的等待时间单调不减。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            enable_jitter: jitter_factor > 0.0,
        }
    }

    /// 创建快速重试策略（测试和本地调试）
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            jitter_factor: 0.0,
            enable_jitter: false,
        }
    }

    /// 计算第 `attempt` 次失败后的退避时间（attempt 从 1 开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let backoff_secs = self.initial_backoff.as_secs_f64() * 2f64.powi(exponent);

        let with_jitter = if self.enable_jitter && self.jitter_factor > 0.0 {
            let jitter_range = backoff_secs * self.jitter_factor.min(1.0);
            backoff_secs + rand::random_range(0.0..=jitter_range)
        } else {
            backoff_secs
        };

        Duration::from_secs_f64(with_jitter.min(self.max_backoff.as_secs_f64()))
    }

    /// 已经尝试 `attempt` 次后是否还应该重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
