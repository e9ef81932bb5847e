// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 查询索引迁移
///
/// 出队路径按 (kind, status, scheduled_at) 扫描，
/// 租约巡检按 (status, lock_expires_at) 扫描
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_dequeue")
                    .table(Jobs::Table)
                    .col(Jobs::Kind)
                    .col(Jobs::Status)
                    .col(Jobs::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_lease_sweep")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .col(Jobs::LockExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_targets_state")
                    .table(Targets::Table)
                    .col(Targets::State)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_targets_netloc")
                    .table(Targets::Table)
                    .col(Targets::Netloc)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pages_netloc")
                    .table(Pages::Table)
                    .col(Pages::Netloc)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_jobs_dequeue").table(Jobs::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_jobs_lease_sweep")
                    .table(Jobs::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_targets_state")
                    .table(Targets::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_targets_netloc")
                    .table(Targets::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_pages_netloc")
                    .table(Pages::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Kind,
    Status,
    ScheduledAt,
    LockExpiresAt,
}

#[derive(DeriveIden)]
enum Targets {
    Table,
    State,
    Netloc,
}

#[derive(DeriveIden)]
enum Pages {
    Table,
    Netloc,
}
