// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::identity::{
    Identity, IdentityHealth, IdentityLease, IdentitySnapshot, LeaseOutcome, LeaseReturn,
    PoolStats,
};
use crate::utils::errors::PoolError;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 身份池配置
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// 进入冷却前允许的连续失败次数
    pub failure_threshold: u32,
    /// 首次冷却时长
    pub cooldown: Duration,
    /// 冷却时长上限
    pub max_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(900),
        }
    }
}

/// 单个身份的可变状态
#[derive(Debug)]
struct SlotState {
    health: IdentityHealth,
    leased: bool,
    /// 连续失败次数
    failure_streak: u32,
    /// 自上次成功以来进入冷却的次数
    cooldown_rounds: u32,
    cooldown_until: Option<Instant>,
    /// 最近一次借出的序号，越小越久未使用
    last_used_seq: u64,
    times_acquired: u64,
    total_successes: u64,
    total_failures: u64,
}

impl SlotState {
    fn new() -> Self {
        Self {
            health: IdentityHealth::Healthy,
            leased: false,
            failure_streak: 0,
            cooldown_rounds: 0,
            cooldown_until: None,
            last_used_seq: 0,
            times_acquired: 0,
            total_successes: 0,
            total_failures: 0,
        }
    }

    /// 冷却到期后乐观地恢复为健康
    fn refresh(&mut self, now: Instant) {
        if self.health == IdentityHealth::CoolingDown
            && self.cooldown_until.is_some_and(|until| until <= now)
        {
            self.health = IdentityHealth::Healthy;
            self.cooldown_until = None;
            self.failure_streak = 0;
        }
    }

    fn is_available(&self) -> bool {
        !self.leased && self.health != IdentityHealth::CoolingDown
    }
}

struct Slot {
    identity: Arc<Identity>,
    state: Mutex<SlotState>,
}

/// 身份池与其借出的租约共享的状态
struct PoolShared {
    slots: Vec<Slot>,
    config: PoolConfig,
    released: Notify,
}

impl PoolShared {
    /// 第 `round` 次冷却的时长
    fn cooldown_for(&self, round: u32) -> Duration {
        let factor = 2u32.saturating_pow(round.saturating_sub(1).min(16));
        self.config
            .cooldown
            .saturating_mul(factor)
            .min(self.config.max_cooldown)
    }

    fn stats(&self) -> PoolStats {
        let now = Instant::now();
        let mut stats = PoolStats {
            total: self.slots.len(),
            ..PoolStats::default()
        };
        for slot in &self.slots {
            let mut state = slot.state.lock();
            state.refresh(now);
            match state.health {
                IdentityHealth::Healthy => stats.healthy += 1,
                IdentityHealth::Degraded => stats.degraded += 1,
                IdentityHealth::CoolingDown => stats.cooling_down += 1,
            }
            if state.leased {
                stats.leased += 1;
            }
        }
        stats
    }
}

impl LeaseReturn for PoolShared {
    /// 成功重置连续失败计数；失败累加计数，达到阈值后进入冷却，
    /// 冷却时长随连续冷却次数翻倍，不超过上限。
    fn return_slot(&self, slot: usize, outcome: LeaseOutcome) {
        let Some(entry) = self.slots.get(slot) else {
            warn!(slot, "Returned lease does not belong to this pool");
            return;
        };

        let mut state = entry.state.lock();
        state.leased = false;
        match outcome {
            LeaseOutcome::Success => {
                state.total_successes += 1;
                state.failure_streak = 0;
                state.cooldown_rounds = 0;
                state.health = IdentityHealth::Healthy;
            }
            LeaseOutcome::Failure => {
                state.total_failures += 1;
                state.failure_streak += 1;
                if state.failure_streak >= self.config.failure_threshold {
                    state.cooldown_rounds += 1;
                    let cooldown = self.cooldown_for(state.cooldown_rounds);
                    state.cooldown_until = Some(Instant::now() + cooldown);
                    state.health = IdentityHealth::CoolingDown;
                    state.failure_streak = 0;
                    counter!("identity_cooldown_total").increment(1);
                    warn!(
                        identity = %entry.identity.label(),
                        cooldown_secs = cooldown.as_secs_f64(),
                        round = state.cooldown_rounds,
                        "Identity placed in cool-down"
                    );
                } else {
                    state.health = IdentityHealth::Degraded;
                }
            }
        }
        drop(state);

        self.released.notify_waiters();
        gauge!("identity_pool_healthy").set(self.stats().healthy as f64);
    }
}

/// 身份池
///
/// 管理一组可轮换的网络出口身份，每次抓取尝试借出一个。
/// 每个身份有独立的锁，借出和归还对同一身份互斥，不同身份之间完全并发。
/// 借出时选择最久未使用的可用身份（健康或降级），保证轮换公平。
pub struct IdentityPool {
    shared: Arc<PoolShared>,
    sequence: AtomicU64,
}

impl IdentityPool {
    pub fn new(identities: Vec<Identity>, config: PoolConfig) -> Self {
        info!(
            identities = identities.len(),
            proxied = identities.iter().filter(|i| i.proxy.is_some()).count(),
            "Identity pool initialized"
        );
        let slots = identities
            .into_iter()
            .map(|identity| Slot {
                identity: Arc::new(identity),
                state: Mutex::new(SlotState::new()),
            })
            .collect();
        Self {
            shared: Arc::new(PoolShared {
                slots,
                config,
                released: Notify::new(),
            }),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.slots.is_empty()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// 借出最久未使用的可用身份
    ///
    /// 不会阻塞：所有身份都在冷却时返回 `Exhausted`，
    /// 可用身份都已借出时返回 `Busy`。
    pub fn acquire(&self) -> Result<IdentityLease, PoolError> {
        let slots = &self.shared.slots;
        if slots.is_empty() {
            return Err(PoolError::Empty);
        }

        let now = Instant::now();
        let mut candidates: Vec<(u64, usize)> = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            let mut state = slot.state.lock();
            state.refresh(now);
            if state.is_available() {
                candidates.push((state.last_used_seq, index));
            }
        }
        candidates.sort_unstable();

        for (_, index) in candidates {
            let slot = &slots[index];
            let mut state = slot.state.lock();
            // 快照之后可能已被其他调用方借走
            if !state.is_available() {
                continue;
            }
            state.leased = true;
            state.last_used_seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            state.times_acquired += 1;
            let health = state.health;
            drop(state);

            counter!("identity_acquire_total", "result" => "ok").increment(1);
            debug!(slot = index, identity = %slot.identity.label(), %health, "Identity leased");
            let owner: Weak<dyn LeaseReturn> = Arc::downgrade(&self.shared) as Weak<PoolShared>;
            return Ok(IdentityLease::new(index, slot.identity.clone(), health, owner));
        }

        let stats = self.stats();
        if stats.cooling_down == stats.total {
            counter!("identity_acquire_total", "result" => "exhausted").increment(1);
            warn!(
                total = stats.total,
                "ALARM: identity pool exhausted, every identity is cooling down"
            );
            Err(PoolError::Exhausted { total: stats.total })
        } else {
            counter!("identity_acquire_total", "result" => "busy").increment(1);
            Err(PoolError::Busy { total: stats.total })
        }
    }

    /// 借出身份，可用身份都已借出时等待归还
    ///
    /// 只为 `Busy` 等待，`Exhausted` 立即返回。
    pub async fn acquire_wait(&self, timeout: Duration) -> Result<IdentityLease, PoolError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.acquire() {
                Err(PoolError::Busy { .. }) => {}
                other => return other,
            }

            // 冷却到期也可能让身份重新可用
            let wake_at = self
                .next_cooldown_expiry()
                .map_or(deadline, |expiry| expiry.min(deadline));
            tokio::select! {
                _ = notified.as_mut() => {}
                _ = tokio::time::sleep_until(wake_at) => {
                    if Instant::now() >= deadline {
                        return match self.acquire() {
                            Err(PoolError::Busy { .. }) => Err(PoolError::Timeout),
                            other => other,
                        };
                    }
                }
            }
        }
    }

    /// 归还身份并记录本次尝试的结果
    ///
    /// 成功重置连续失败计数；失败累加计数，达到阈值后进入冷却。
    pub fn release(&self, lease: IdentityLease, outcome: LeaseOutcome) {
        if !lease.is_owned_by(&self.shared) {
            warn!(slot = lease.slot, "Released lease belongs to another pool");
        }
        lease.complete(outcome);
    }

    fn next_cooldown_expiry(&self) -> Option<Instant> {
        self.shared
            .slots
            .iter()
            .filter_map(|slot| slot.state.lock().cooldown_until)
            .min()
    }

    /// 每个身份的健康统计
    pub fn snapshot(&self) -> Vec<IdentitySnapshot> {
        let now = Instant::now();
        self.shared
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let mut state = slot.state.lock();
                state.refresh(now);
                IdentitySnapshot {
                    slot: index,
                    label: slot.identity.label(),
                    user_agent: slot.identity.user_agent.clone(),
                    health: state.health,
                    leased: state.leased,
                    failure_streak: state.failure_streak,
                    times_acquired: state.times_acquired,
                    total_successes: state.total_successes,
                    total_failures: state.total_failures,
                    cooldown_remaining_ms: state
                        .cooldown_until
                        .map(|until| until.saturating_duration_since(now).as_millis() as u64),
                }
            })
            .collect()
    }

    /// 身份池整体统计
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }
}
