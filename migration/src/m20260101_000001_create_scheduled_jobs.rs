// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScheduledJobs::Name).string().not_null())
                    .col(ColumnDef::new(ScheduledJobs::Spec).json().not_null())
                    .col(ColumnDef::new(ScheduledJobs::Recurrence).json().not_null())
                    .col(ColumnDef::new(ScheduledJobs::State).string().not_null())
                    .col(ColumnDef::new(ScheduledJobs::ExportTargets).json().not_null())
                    .col(ColumnDef::new(ScheduledJobs::LastRunAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScheduledJobs::NextRunAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduledJobs::LastResult).json())
                    .col(
                        ColumnDef::new(ScheduledJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduledJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 调度器按状态和下次执行时间查找到期任务
        manager
            .create_index(
                Index::create()
                    .name("idx_scheduled_jobs_state_next_run")
                    .table(ScheduledJobs::Table)
                    .col(ScheduledJobs::State)
                    .col(ScheduledJobs::NextRunAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScheduledJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScheduledJobs {
    Table,
    Id,
    Name,
    Spec,
    Recurrence,
    State,
    ExportTargets,
    LastRunAt,
    NextRunAt,
    LastResult,
    CreatedAt,
    UpdatedAt,
}
