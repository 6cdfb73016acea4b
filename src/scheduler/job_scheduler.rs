// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{JobDefinition, JobRunSummary, JobState, ScheduledJob};
use crate::domain::models::report::{CollectionReport, CollectionResult};
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::result_sink::ResultSink;
use crate::engines::collection::CollectionRunner;
use crate::scheduler::clock::Clock;
use crate::utils::errors::{CollectionError, SchedulerError};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 调度器状态摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub total_jobs: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 最早的下一次执行时间
    pub next_run_at: Option<DateTime<Utc>>,
    /// 正在执行的采集数
    pub in_flight: usize,
    /// 等待重新写入的任务数
    pub pending_writes: usize,
}

/// 管理接口发给驱动循环的命令
enum Command {
    Create {
        definition: JobDefinition,
        reply: oneshot::Sender<Result<ScheduledJob, SchedulerError>>,
    },
    Update {
        id: Uuid,
        definition: JobDefinition,
        reply: oneshot::Sender<Result<ScheduledJob, SchedulerError>>,
    },
    Delete {
        id: Uuid,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Cancel {
        id: Uuid,
        reply: oneshot::Sender<Result<bool, SchedulerError>>,
    },
    Status {
        reply: oneshot::Sender<Result<SchedulerStatus, SchedulerError>>,
    },
}

/// 一次运行的结果
enum RunOutcome {
    Finished(Result<CollectionResult, CollectionError>),
    Panicked(String),
}

struct Completion {
    job_id: Uuid,
    finished_at: DateTime<Utc>,
    outcome: RunOutcome,
}

struct RunningJob {
    job: ScheduledJob,
    cancel: CancellationToken,
}

/// 调度器句柄
///
/// 管理接口通过它把修改交给驱动循环串行执行，驱动循环是任务存储的唯一写入方。
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> Command,
    ) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SchedulerError::Unavailable)?;
        rx.await.map_err(|_| SchedulerError::Unavailable)?
    }

    pub async fn create(&self, definition: JobDefinition) -> Result<ScheduledJob, SchedulerError> {
        self.request(|reply| Command::Create { definition, reply })
            .await
    }

    pub async fn update(
        &self,
        id: Uuid,
        definition: JobDefinition,
    ) -> Result<ScheduledJob, SchedulerError> {
        self.request(|reply| Command::Update {
            id,
            definition,
            reply,
        })
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Delete { id, reply }).await
    }

    /// 取消正在执行的运行，返回是否确有运行被取消
    pub async fn cancel(&self, id: Uuid) -> Result<bool, SchedulerError> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        self.request(|reply| Command::Status { reply }).await
    }
}

/// 定时任务调度器
///
/// 驱动循环按固定间隔醒来，把到期的等待任务转为执行中并交给采集协调器，
/// 运行结束后记录结果、转为终态，再按重复规则重新进入等待。
/// 每次状态转换后立即持久化。
pub struct JobScheduler {
    repository: Arc<dyn JobRepository>,
    runner: Arc<dyn CollectionRunner>,
    sink: Option<Arc<dyn ResultSink>>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    running: HashMap<Uuid, RunningJob>,
    /// 完成后持久化失败、等待下次 tick 重试的任务
    pending_writes: Vec<ScheduledJob>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    commands_rx: mpsc::Receiver<Command>,
}

impl JobScheduler {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        runner: Arc<dyn CollectionRunner>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> (Self, SchedulerHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            repository,
            runner,
            sink: None,
            clock,
            tick_interval,
            running: HashMap::new(),
            pending_writes: Vec::new(),
            completions_tx,
            completions_rx,
            commands_rx,
        };
        (
            scheduler,
            SchedulerHandle {
                commands: commands_tx,
            },
        )
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 正在执行的运行数
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    async fn persist(&self, job: &ScheduledJob) -> Result<ScheduledJob, SchedulerError> {
        self.repository.update(job).await.map_err(|e| {
            counter!("scheduler_persistence_errors_total").increment(1);
            error!(job_id = %job.id, state = %job.state, error = %e, "ALARM: failed to persist scheduled job");
            SchedulerError::Persistence(e)
        })
    }

    /// 启动时恢复任务状态
    ///
    /// 上次进程退出时仍在执行的任务记为失败（被中断）并重新进入等待；
    /// 已经错过的等待任务直接推进到下一个未来时刻，不补跑。
    pub async fn recover(&mut self) -> Result<usize, SchedulerError> {
        let now = self.clock.now();
        let mut recovered = 0;

        for job in self.repository.list().await? {
            let job_id = job.id;
            let restored = match job.state {
                JobState::Running if !self.running.contains_key(&job_id) => {
                    let started_at = job.last_run_at.unwrap_or(now);
                    let summary = JobRunSummary {
                        run_id: None,
                        started_at,
                        finished_at: now,
                        business_count: 0,
                        succeeded_platforms: Vec::new(),
                        failed_platforms: Vec::new(),
                        error: Some("interrupted by scheduler restart".to_string()),
                    };
                    let failed = job.fail(summary, now)?;
                    self.persist(&failed).await?;
                    Some(failed.reschedule(now)?)
                }
                JobState::Succeeded | JobState::Failed if !job.is_retired() => {
                    Some(job.reschedule(now)?)
                }
                // 错过的一次性任务保留原时刻，由下一次检查执行
                JobState::Pending if job.next_run_at <= now && !job.recurrence.is_one_time() => {
                    Some(job.skip_missed(now))
                }
                _ => None,
            };

            if let Some(job) = restored {
                self.persist(&job).await?;
                info!(job_id = %job_id, next_run_at = %job.next_run_at, "Recovered scheduled job");
                recovered += 1;
            }
        }

        Ok(recovered)
    }

    /// 重新写入之前持久化失败的任务
    async fn flush_pending_writes(&mut self) -> Result<(), SchedulerError> {
        while let Some(job) = self.pending_writes.first() {
            self.persist(job).await?;
            info!(job_id = %job.id, "Persisted deferred job state");
            self.pending_writes.remove(0);
        }
        Ok(())
    }

    /// 执行一次调度检查，返回派发的任务数
    pub async fn tick(&mut self) -> Result<usize, SchedulerError> {
        self.flush_pending_writes().await?;

        let now = self.clock.now();
        let due = self.repository.find_due(now).await?;
        let mut dispatched = 0;

        for job in due {
            if self.running.contains_key(&job.id) {
                continue;
            }
            let job = job.start(now)?;
            // 先持久化执行中状态再派发，写入失败时本次不派发
            let job = self.persist(&job).await?;
            self.dispatch(job);
            dispatched += 1;
        }

        if dispatched > 0 {
            debug!(dispatched, "Scheduler tick dispatched jobs");
        }
        Ok(dispatched)
    }

    fn dispatch(&mut self, job: ScheduledJob) {
        let cancel = CancellationToken::new();
        let runner = self.runner.clone();
        let completions = self.completions_tx.clone();
        let clock = self.clock.clone();
        let spec = job.spec.clone();
        let job_id = job.id;
        let token = cancel.clone();

        counter!("scheduler_jobs_dispatched_total").increment(1);
        info!(job_id = %job_id, name = %job.name, "Dispatching scheduled job");

        tokio::spawn(async move {
            let run = tokio::spawn(async move { runner.run(&spec, token).await });
            let outcome = match run.await {
                Ok(result) => RunOutcome::Finished(result),
                Err(e) => RunOutcome::Panicked(e.to_string()),
            };
            let _ = completions.send(Completion {
                job_id,
                finished_at: clock.now(),
                outcome,
            });
        });

        self.running.insert(job_id, RunningJob { job, cancel });
    }

    /// 处理当前已经完成的运行，不等待
    pub async fn drain(&mut self) -> Result<usize, SchedulerError> {
        let mut handled = 0;
        let mut first_error = None;
        while let Ok(completion) = self.completions_rx.try_recv() {
            handled += 1;
            if let Err(e) = self.complete(completion).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(handled), Err)
    }

    /// 等待所有正在执行的运行完成并记录结果
    pub async fn settle(&mut self) -> Result<(), SchedulerError> {
        let mut first_error = None;
        while !self.running.is_empty() {
            let Some(completion) = self.completions_rx.recv().await else {
                break;
            };
            if let Err(e) = self.complete(completion).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn complete(&mut self, completion: Completion) -> Result<(), SchedulerError> {
        let Some(RunningJob { job, .. }) = self.running.remove(&completion.job_id) else {
            warn!(job_id = %completion.job_id, "Completion for unknown run ignored");
            return Ok(());
        };
        let now = completion.finished_at;
        let started_at = job.last_run_at.unwrap_or(now);

        let (finished, result) = match completion.outcome {
            RunOutcome::Finished(Ok(result)) => {
                let summary = summarize(&result.report, Some(result.run_id), result.businesses.len(), None);
                info!(
                    job_id = %job.id,
                    businesses = result.businesses.len(),
                    degraded = summary.is_degraded(),
                    "Scheduled job succeeded"
                );
                (job.succeed(summary, now)?, Some(result))
            }
            RunOutcome::Finished(Err(e)) => {
                let summary = match e.report() {
                    Some(report) => summarize(report, None, 0, Some(e.to_string())),
                    None => failure_summary(started_at, now, e.to_string()),
                };
                warn!(job_id = %job.id, error = %e, "Scheduled job failed");
                (job.fail(summary, now)?, None)
            }
            RunOutcome::Panicked(reason) => {
                error!(job_id = %job.id, %reason, "Scheduled job run aborted");
                let summary = failure_summary(started_at, now, format!("run aborted: {}", reason));
                (job.fail(summary, now)?, None)
            }
        };

        let rearmed = finished.clone().reschedule(now)?;
        for state in [&finished, &rearmed] {
            if let Err(e) = self.persist(state).await {
                // 最新状态留到下次 tick 重写
                self.pending_writes.retain(|pending| pending.id != rearmed.id);
                self.pending_writes.push(rearmed.clone());
                return Err(e);
            }
        }
        if rearmed.is_retired() {
            info!(job_id = %rearmed.id, state = %rearmed.state, "One-time job retired");
        } else {
            info!(job_id = %rearmed.id, next_run_at = %rearmed.next_run_at, "Scheduled job re-armed");
        }

        if let (Some(sink), Some(result)) = (&self.sink, result) {
            if let Err(e) = sink.publish(&finished, &result).await {
                warn!(job_id = %finished.id, error = %e, "Failed to publish job result");
            }
        }
        Ok(())
    }

    /// 创建任务
    pub async fn create_job(
        &mut self,
        definition: JobDefinition,
    ) -> Result<ScheduledJob, SchedulerError> {
        let job = definition.into_job(self.clock.now())?;
        let created = self.repository.create(&job).await?;
        info!(job_id = %created.id, name = %created.name, next_run_at = %created.next_run_at, "Scheduled job created");
        Ok(created)
    }

    /// 修改任务定义，执行中的任务不能修改
    ///
    /// 等待重新写入的任务以缓冲中的最新状态为准，存储中的仍是执行中状态。
    pub async fn update_job(
        &mut self,
        id: Uuid,
        definition: JobDefinition,
    ) -> Result<ScheduledJob, SchedulerError> {
        if self.running.contains_key(&id) {
            return Err(SchedulerError::JobRunning(id));
        }
        let buffered = self.pending_writes.iter().find(|job| job.id == id).cloned();
        let job = match buffered {
            Some(job) => job,
            None => self
                .repository
                .find_by_id(id)
                .await?
                .ok_or(SchedulerError::NotFound(id))?,
        };
        let job = job.redefine(definition, self.clock.now())?;
        let saved = self.persist(&job).await?;
        self.pending_writes.retain(|pending| pending.id != id);
        Ok(saved)
    }

    /// 删除任务，执行中的任务需要先取消
    pub async fn delete_job(&mut self, id: Uuid) -> Result<(), SchedulerError> {
        if self.running.contains_key(&id) {
            return Err(SchedulerError::JobRunning(id));
        }
        if !self.repository.delete(id).await? {
            return Err(SchedulerError::NotFound(id));
        }
        self.pending_writes.retain(|job| job.id != id);
        info!(job_id = %id, "Scheduled job deleted");
        Ok(())
    }

    /// 取消正在执行的运行
    ///
    /// 运行结束后任务记为失败，原因为取消。
    pub async fn cancel_job(&mut self, id: Uuid) -> Result<bool, SchedulerError> {
        if let Some(running) = self.running.get(&id) {
            running.cancel.cancel();
            info!(job_id = %id, "Cancellation requested for running job");
            return Ok(true);
        }
        match self.repository.find_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(SchedulerError::NotFound(id)),
        }
    }

    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let jobs = self.repository.list().await?;
        let mut status = SchedulerStatus {
            total_jobs: jobs.len(),
            in_flight: self.running.len(),
            pending_writes: self.pending_writes.len(),
            ..SchedulerStatus::default()
        };
        for job in &jobs {
            match job.state {
                JobState::Pending => status.pending += 1,
                JobState::Running => status.running += 1,
                JobState::Succeeded => status.succeeded += 1,
                JobState::Failed => status.failed += 1,
            }
        }
        status.next_run_at = jobs
            .iter()
            .filter(|job| job.state == JobState::Pending)
            .map(|job| job.next_run_at)
            .min();
        Ok(status)
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Create { definition, reply } => {
                let _ = reply.send(self.create_job(definition).await);
            }
            Command::Update {
                id,
                definition,
                reply,
            } => {
                let _ = reply.send(self.update_job(id, definition).await);
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(self.delete_job(id).await);
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel_job(id).await);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status().await);
            }
        }
    }

    /// 运行驱动循环直到 `shutdown` 被取消
    ///
    /// 退出时取消所有正在执行的运行，并等待它们的结果落盘。
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(tick_secs = self.tick_interval.as_secs_f64(), "Scheduler started");
        match self.recover().await {
            Ok(count) if count > 0 => info!(count, "Recovered jobs after restart"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "ALARM: scheduler recovery failed"),
        }

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "ALARM: scheduler tick failed");
                    }
                }
                Some(completion) = self.completions_rx.recv() => {
                    if let Err(e) = self.complete(completion).await {
                        error!(error = %e, "ALARM: failed to record job completion");
                    }
                }
                command = self.commands_rx.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => commands_open = false,
                },
            }
        }

        info!(in_flight = self.running.len(), "Scheduler shutting down");
        for running in self.running.values() {
            running.cancel.cancel();
        }
        if let Err(e) = self.settle().await {
            error!(error = %e, "ALARM: failed to record job completion during shutdown");
        }
        info!("Scheduler stopped");
    }
}

fn summarize(
    report: &CollectionReport,
    run_id: Option<Uuid>,
    business_count: usize,
    error: Option<String>,
) -> JobRunSummary {
    JobRunSummary {
        run_id,
        started_at: report.started_at,
        finished_at: report.finished_at,
        business_count,
        succeeded_platforms: report
            .succeeded_platforms()
            .into_iter()
            .map(String::from)
            .collect(),
        failed_platforms: report
            .failed_platforms()
            .into_iter()
            .map(|(platform, reason)| format!("{}: {}", platform, reason))
            .collect(),
        error,
    }
}

fn failure_summary(
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    error: String,
) -> JobRunSummary {
    JobRunSummary {
        run_id: None,
        started_at,
        finished_at,
        business_count: 0,
        succeeded_platforms: Vec::new(),
        failed_platforms: Vec::new(),
        error: Some(error),
    }
}

#[cfg(test)]
#[path = "job_scheduler_test.rs"]
mod tests;
