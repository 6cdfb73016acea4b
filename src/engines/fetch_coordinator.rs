// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::business::RawBusinessRecord;
use crate::domain::models::identity::{IdentityLease, LeaseOutcome};
use crate::domain::models::search_spec::{PlatformId, SearchSpecification};
use crate::domain::platform::{AdapterError, PlatformAdapter};
use crate::engines::identity_pool::IdentityPool;
use crate::utils::errors::{FetchError, PoolError};
use crate::utils::retry_policy::RetryPolicy;
use dashmap::DashMap;
use futures::TryStreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// 一次成功抓取的结果
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSuccess {
    pub records: Vec<RawBusinessRecord>,
    /// 使用的尝试次数（包含成功的那次）
    pub attempts: u32,
}

/// 单次尝试失败的原因
enum AttemptFailure {
    Transient(String),
    Pool(PoolError),
}

/// 弹性抓取协调器
///
/// 包装一次平台适配器调用：为每次尝试借出一个身份，
/// 按平台控制请求节奏，瞬时错误按指数退避重试，永久错误立即失败。
pub struct ResilientFetcher {
    pool: Arc<IdentityPool>,
    policy: RetryPolicy,
    request_interval: Duration,
    fetch_timeout: Duration,
    pacers: DashMap<PlatformId, Arc<Pacer>>,
}

impl ResilientFetcher {
    pub fn new(pool: Arc<IdentityPool>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            policy,
            request_interval: Duration::ZERO,
            fetch_timeout: Duration::from_secs(300),
            pacers: DashMap::new(),
        }
    }

    /// 同一平台相邻两次请求的最小间隔，为零时不限速
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    /// 单次适配器调用（包括读完记录流）的超时时间
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &Arc<IdentityPool> {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn pace(&self, platform: &PlatformId) {
        let Some(quota) = Quota::with_period(self.request_interval) else {
            return;
        };
        let pacer = self
            .pacers
            .entry(platform.clone())
            .or_insert_with(|| Arc::new(RateLimiter::direct(quota)))
            .clone();
        pacer.until_ready().await;
    }

    /// 调用适配器并读完整个记录流
    async fn attempt(
        &self,
        spec: &SearchSpecification,
        adapter: &dyn PlatformAdapter,
        lease: &IdentityLease,
    ) -> Result<Vec<RawBusinessRecord>, AdapterError> {
        let stream = adapter.search(spec, lease).await?;
        stream.try_collect().await
    }

    /// 抓取单个平台的原始记录
    ///
    /// # Returns
    ///
    /// * `Ok(FetchSuccess)` - 成功返回的记录及尝试次数
    /// * `Err(FetchError::Permanent)` - 适配器报告永久错误，未重试
    /// * `Err(FetchError::ExhaustedRetries)` - 瞬时错误持续到重试上限
    /// * `Err(FetchError::PoolExhausted)` - 最后一次尝试时仍没有可用身份
    pub async fn fetch(
        &self,
        spec: &SearchSpecification,
        adapter: &dyn PlatformAdapter,
    ) -> Result<FetchSuccess, FetchError> {
        let platform = adapter.id();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let failure = match self.pool.acquire_wait(self.fetch_timeout).await {
                Ok(lease) => {
                    self.pace(&platform).await;
                    let identity = lease.identity().label();
                    let result =
                        tokio::time::timeout(self.fetch_timeout, self.attempt(spec, adapter, &lease))
                            .await;

                    match result {
                        Ok(Ok(records)) => {
                            self.pool.release(lease, LeaseOutcome::Success);
                            counter!("fetch_attempts_total", "platform" => platform.to_string(), "result" => "success")
                                .increment(1);
                            info!(
                                platform = %platform,
                                attempt,
                                records = records.len(),
                                "Platform fetch succeeded"
                            );
                            return Ok(FetchSuccess {
                                records,
                                attempts: attempt,
                            });
                        }
                        Ok(Err(AdapterError::Permanent { reason })) => {
                            // 平台拒绝的是查询本身，身份没有问题
                            self.pool.release(lease, LeaseOutcome::Success);
                            counter!("fetch_attempts_total", "platform" => platform.to_string(), "result" => "permanent")
                                .increment(1);
                            warn!(platform = %platform, attempt, %reason, "Permanent fetch failure, not retrying");
                            return Err(FetchError::Permanent { reason });
                        }
                        Ok(Err(AdapterError::Transient { reason })) => {
                            self.pool.release(lease, LeaseOutcome::Failure);
                            counter!("fetch_attempts_total", "platform" => platform.to_string(), "result" => "transient")
                                .increment(1);
                            AttemptFailure::Transient(reason)
                        }
                        Err(_) => {
                            self.pool.release(lease, LeaseOutcome::Failure);
                            counter!("fetch_attempts_total", "platform" => platform.to_string(), "result" => "timeout")
                                .increment(1);
                            AttemptFailure::Transient(format!(
                                "timed out after {}s via {}",
                                self.fetch_timeout.as_secs_f64(),
                                identity
                            ))
                        }
                    }
                }
                Err(PoolError::Empty) => {
                    warn!(platform = %platform, "ALARM: identity pool is empty, cannot fetch");
                    return Err(FetchError::PoolExhausted { attempts: attempt });
                }
                Err(e) => {
                    counter!("fetch_attempts_total", "platform" => platform.to_string(), "result" => "no_identity")
                        .increment(1);
                    AttemptFailure::Pool(e)
                }
            };

            if !self.policy.should_retry(attempt) {
                return Err(match failure {
                    AttemptFailure::Transient(last_reason) => {
                        warn!(platform = %platform, attempts = attempt, %last_reason, "Fetch retries exhausted");
                        FetchError::ExhaustedRetries {
                            attempts: attempt,
                            last_reason,
                        }
                    }
                    AttemptFailure::Pool(e) => {
                        warn!(platform = %platform, attempts = attempt, error = %e, "No identity available for final attempt");
                        FetchError::PoolExhausted { attempts: attempt }
                    }
                });
            }

            let delay = self.policy.calculate_backoff(attempt);
            histogram!("fetch_backoff_seconds").record(delay.as_secs_f64());
            match &failure {
                AttemptFailure::Transient(reason) => debug!(
                    platform = %platform,
                    attempt,
                    %reason,
                    delay_ms = delay.as_millis() as u64,
                    "Transient fetch failure, backing off"
                ),
                AttemptFailure::Pool(e) => debug!(
                    platform = %platform,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "No identity available, backing off"
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }
}
