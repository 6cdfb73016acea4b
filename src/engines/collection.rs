// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::business::RawBusinessRecord;
use crate::domain::models::report::{CollectionReport, CollectionResult, PlatformOutcome};
use crate::domain::models::search_spec::{PlatformId, SearchSpecification};
use crate::domain::platform::PlatformAdapter;
use crate::domain::services::merge_engine::MergeEngine;
use crate::domain::services::record_cleaner::prepare_records;
use crate::engines::fetch_coordinator::{FetchSuccess, ResilientFetcher};
use crate::engines::identity_pool::IdentityPool;
use crate::utils::errors::{CollectionError, FetchError};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// 执行一次完整采集的能力
///
/// 调度器只依赖这个特质，测试中可以替换为假实现。
#[async_trait]
pub trait CollectionRunner: Send + Sync {
    async fn run(
        &self,
        spec: &SearchSpecification,
        cancel: CancellationToken,
    ) -> Result<CollectionResult, CollectionError>;
}

/// 采集协调器
///
/// 为规格中每个启用的平台派发一次弹性抓取，同时进行的抓取不超过 K 个，
/// 超出的平台排队等待。所有抓取结束后才把成功的原始记录交给合并引擎。
pub struct CollectionCoordinator {
    fetcher: Arc<ResilientFetcher>,
    adapters: BTreeMap<PlatformId, Arc<dyn PlatformAdapter>>,
    merge_engine: MergeEngine,
    max_concurrent_platforms: usize,
}

impl CollectionCoordinator {
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        merge_engine: MergeEngine,
        max_concurrent_platforms: usize,
    ) -> Self {
        Self {
            fetcher,
            adapters: BTreeMap::new(),
            merge_engine,
            max_concurrent_platforms: max_concurrent_platforms.max(1),
        }
    }

    /// 注册平台适配器，同一平台重复注册时替换旧的
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let id = adapter.id();
        if self.adapters.insert(id.clone(), adapter).is_some() {
            warn!(platform = %id, "Replacing previously registered platform adapter");
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// 已注册的平台
    pub fn platforms(&self) -> Vec<PlatformId> {
        self.adapters.keys().cloned().collect()
    }

    pub fn identity_pool(&self) -> &Arc<IdentityPool> {
        self.fetcher.pool()
    }

    pub fn merge_engine(&self) -> &MergeEngine {
        &self.merge_engine
    }

    /// 执行一次采集
    pub async fn collect(
        &self,
        spec: &SearchSpecification,
    ) -> Result<CollectionResult, CollectionError> {
        self.collect_with_cancel(spec, CancellationToken::new()).await
    }

    /// 执行一次可取消的采集
    ///
    /// 取消只影响尚未派发的平台，已在进行的抓取会跑完或到达自身的重试上限。
    /// 被取消的采集返回 `CollectionError::Cancelled`，其中的报告记录了每个平台的结果。
    pub async fn collect_with_cancel(
        &self,
        spec: &SearchSpecification,
        cancel: CancellationToken,
    ) -> Result<CollectionResult, CollectionError> {
        spec.validate()
            .map_err(|e| CollectionError::InvalidSpecification(e.to_string()))?;

        let run_id = Uuid::new_v4();
        let mut report = CollectionReport::new(Utc::now());
        info!(
            %run_id,
            location = %spec.location,
            platforms = spec.platforms.len(),
            "Collection run started"
        );

        let spec = Arc::new(spec.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_platforms));
        let mut tasks: JoinSet<(PlatformId, Result<FetchSuccess, FetchError>)> = JoinSet::new();
        let mut dispatched = BTreeSet::new();

        for platform in spec.platforms.iter().cloned() {
            if cancel.is_cancelled() {
                report.outcomes.insert(platform, PlatformOutcome::Cancelled);
                continue;
            }
            let Some(adapter) = self.adapters.get(&platform).cloned() else {
                warn!(%run_id, platform = %platform, "No adapter registered for platform");
                report
                    .outcomes
                    .insert(platform, PlatformOutcome::UnsupportedPlatform);
                continue;
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.outcomes.insert(platform, PlatformOutcome::Cancelled);
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => permit,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    report.outcomes.insert(
                        platform,
                        PlatformOutcome::Aborted {
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let fetcher = self.fetcher.clone();
            let spec = spec.clone();
            dispatched.insert(platform.clone());
            tasks.spawn(async move {
                let _permit = permit;
                let result = fetcher.fetch(&spec, adapter.as_ref()).await;
                (platform, result)
            });
        }

        // 合并前必须等所有已派发的抓取结束
        let mut raw: BTreeMap<PlatformId, Vec<RawBusinessRecord>> = BTreeMap::new();
        let mut last_join_error = None;
        while let Some(joined) = tasks.join_next().await {
            let (platform, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!(%run_id, error = %e, "Platform fetch task aborted");
                    last_join_error = Some(e.to_string());
                    continue;
                }
            };
            dispatched.remove(&platform);

            let outcome = match result {
                Ok(success) => {
                    let fetched = success.records.len();
                    let accepted = prepare_records(success.records, &spec);
                    let outcome = PlatformOutcome::Succeeded {
                        fetched,
                        accepted: accepted.len(),
                        attempts: success.attempts,
                    };
                    raw.insert(platform.clone(), accepted);
                    outcome
                }
                Err(FetchError::Permanent { reason }) => PlatformOutcome::PermanentFailure { reason },
                Err(FetchError::ExhaustedRetries {
                    attempts,
                    last_reason,
                }) => PlatformOutcome::ExhaustedRetries {
                    attempts,
                    last_reason,
                },
                Err(FetchError::PoolExhausted { attempts }) => {
                    PlatformOutcome::PoolExhausted { attempts }
                }
            };
            info!(%run_id, platform = %platform, outcome = outcome.label(), "Platform finished");
            report.outcomes.insert(platform, outcome);
        }
        for platform in dispatched {
            report.outcomes.insert(
                platform,
                PlatformOutcome::Aborted {
                    reason: last_join_error
                        .clone()
                        .unwrap_or_else(|| "fetch task did not report".to_string()),
                },
            );
        }

        report.raw_record_count = raw.values().map(Vec::len).sum();
        report.finished_at = Utc::now();

        if cancel.is_cancelled() {
            counter!("collection_runs_total", "result" => "cancelled").increment(1);
            warn!(%run_id, "Collection run cancelled");
            return Err(CollectionError::Cancelled {
                report: Box::new(report),
            });
        }
        if !report.any_succeeded() {
            counter!("collection_runs_total", "result" => "failed").increment(1);
            error!(%run_id, failed = ?report.failed_platforms(), "Every platform failed, nothing to merge");
            return Err(CollectionError::MergeInputEmpty {
                report: Box::new(report),
            });
        }

        let businesses = self.merge_engine.merge(raw);
        report.canonical_count = businesses.len();
        report.finished_at = Utc::now();
        counter!("merge_groups_total").increment(businesses.len() as u64);

        let degraded = report.is_degraded();
        counter!(
            "collection_runs_total",
            "result" => if degraded { "degraded" } else { "succeeded" }
        )
        .increment(1);
        info!(
            %run_id,
            raw_records = report.raw_record_count,
            canonical = report.canonical_count,
            degraded,
            "Collection run finished"
        );

        Ok(CollectionResult {
            run_id,
            businesses,
            report,
        })
    }
}

#[async_trait]
impl CollectionRunner for CollectionCoordinator {
    async fn run(
        &self,
        spec: &SearchSpecification,
        cancel: CancellationToken,
    ) -> Result<CollectionResult, CollectionError> {
        self.collect_with_cancel(spec, cancel).await
    }
}

#[cfg(test)]
#[path = "collection_test.rs"]
mod tests;
