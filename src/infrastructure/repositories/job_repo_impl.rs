// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::job::{JobState, ScheduledJob};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use crate::infrastructure::database::entities::scheduled_job as job_entity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::*;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// 定时任务仓库实现
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn decode<T: DeserializeOwned>(
    id: Uuid,
    column: &str,
    value: serde_json::Value,
) -> Result<T, RepositoryError> {
    serde_json::from_value(value).map_err(|e| RepositoryError::Corrupt {
        id,
        reason: format!("{}: {}", column, e),
    })
}

fn encode<T: serde::Serialize>(
    id: Uuid,
    column: &str,
    value: &T,
) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(value).map_err(|e| RepositoryError::Corrupt {
        id,
        reason: format!("{}: {}", column, e),
    })
}

impl TryFrom<job_entity::Model> for ScheduledJob {
    type Error = RepositoryError;

    fn try_from(m: job_entity::Model) -> Result<Self, Self::Error> {
        let id = m.id;
        let state = m.state.parse::<JobState>().map_err(|_| RepositoryError::Corrupt {
            id,
            reason: format!("invalid job state '{}'", m.state),
        })?;

        Ok(ScheduledJob {
            id,
            name: m.name,
            spec: decode(id, "spec", m.spec)?,
            recurrence: decode(id, "recurrence", m.recurrence)?,
            state,
            export_targets: decode(id, "export_targets", m.export_targets)?,
            last_run_at: m.last_run_at.map(Into::into),
            next_run_at: m.next_run_at.into(),
            last_result: m
                .last_result
                .map(|value| decode(id, "last_result", value))
                .transpose()?,
            created_at: m.created_at.into(),
            updated_at: m.updated_at.into(),
        })
    }
}

fn to_active_model(job: &ScheduledJob) -> Result<job_entity::ActiveModel, RepositoryError> {
    Ok(job_entity::ActiveModel {
        id: Set(job.id),
        name: Set(job.name.clone()),
        spec: Set(encode(job.id, "spec", &job.spec)?),
        recurrence: Set(encode(job.id, "recurrence", &job.recurrence)?),
        state: Set(job.state.to_string()),
        export_targets: Set(encode(job.id, "export_targets", &job.export_targets)?),
        last_run_at: Set(job.last_run_at.map(Into::into)),
        next_run_at: Set(job.next_run_at.into()),
        last_result: Set(job
            .last_result
            .as_ref()
            .map(|summary| encode(job.id, "last_result", summary))
            .transpose()?),
        created_at: Set(job.created_at.into()),
        updated_at: Set(job.updated_at.into()),
    })
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError> {
        to_active_model(job)?.insert(self.db.as_ref()).await?;
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledJob>, RepositoryError> {
        job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(ScheduledJob::try_from)
            .transpose()
    }

    async fn update(&self, job: &ScheduledJob) -> Result<ScheduledJob, RepositoryError> {
        match to_active_model(job)?.update(self.db.as_ref()).await {
            Ok(_) => Ok(job.clone()),
            Err(DbErr::RecordNotUpdated) => Err(RepositoryError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = job_entity::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>, RepositoryError> {
        job_entity::Entity::find()
            .order_by_asc(job_entity::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(ScheduledJob::try_from)
            .collect()
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, RepositoryError> {
        job_entity::Entity::find()
            .filter(job_entity::Column::State.eq(JobState::Pending.to_string()))
            .filter(job_entity::Column::NextRunAt.lte(now.fixed_offset()))
            .order_by_asc(job_entity::Column::NextRunAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(ScheduledJob::try_from)
            .collect()
    }
}
