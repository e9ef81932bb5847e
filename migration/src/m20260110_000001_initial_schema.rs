// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 数据库初始模式迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    /// 应用数据库迁移
    ///
    /// # 参数
    ///
    /// * `manager` - 数据库模式管理器
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 迁移成功
    /// * `Err(DbErr)` - 迁移失败
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Create targets table (frontier store)
        manager
            .create_table(
                Table::create()
                    .table(Targets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Targets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Targets::Url).string().not_null())
                    .col(ColumnDef::new(Targets::Netloc).string().not_null())
                    .col(ColumnDef::new(Targets::Parent).string().null())
                    .col(ColumnDef::new(Targets::Depth).integer().not_null())
                    .col(ColumnDef::new(Targets::State).string().not_null())
                    .col(
                        ColumnDef::new(Targets::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Targets::IsOnion)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Targets::FirstSeen)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Targets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // register的原子性依赖这个唯一索引：并发注册同一标识符
        // 恰好一次插入成功
        manager
            .create_index(
                Index::create()
                    .name("uq_targets_url")
                    .table(Targets::Table)
                    .col(Targets::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 2. Create jobs table (durable queue)
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Jobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Jobs::Kind).string().not_null())
                    .col(ColumnDef::new(Jobs::PayloadRef).string().not_null())
                    .col(ColumnDef::new(Jobs::Status).string().not_null())
                    .col(
                        ColumnDef::new(Jobs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Jobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(Jobs::ScheduledAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Jobs::LockToken).uuid())
                    .col(ColumnDef::new(Jobs::LockExpiresAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Jobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Jobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 幂等键：行只在pending/leased期间存在，
        // 唯一索引即at-most-one-in-flight不变量
        manager
            .create_index(
                Index::create()
                    .name("uq_jobs_kind_payload")
                    .table(Jobs::Table)
                    .col(Jobs::Kind)
                    .col(Jobs::PayloadRef)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 3. Create pages table
        manager
            .create_table(
                Table::create()
                    .table(Pages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Pages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Pages::TargetUrl).string().not_null())
                    .col(ColumnDef::new(Pages::Netloc).string().not_null())
                    .col(ColumnDef::new(Pages::StatusCode).integer().null())
                    .col(ColumnDef::new(Pages::FetchOutcome).string().not_null())
                    .col(ColumnDef::new(Pages::Title).text().null())
                    .col(ColumnDef::new(Pages::Body).text().null())
                    .col(ColumnDef::new(Pages::ContentRef).string().null())
                    .col(ColumnDef::new(Pages::Artifacts).json().not_null())
                    .col(ColumnDef::new(Pages::CaptureRef).string().null())
                    .col(ColumnDef::new(Pages::Language).string().null())
                    .col(ColumnDef::new(Pages::Subject).string().null())
                    .col(ColumnDef::new(Pages::SubjectConfidence).double().null())
                    .col(ColumnDef::new(Pages::CaptureState).string().not_null())
                    .col(ColumnDef::new(Pages::ClassifyState).string().not_null())
                    .col(
                        ColumnDef::new(Pages::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Pages::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Pages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Pages::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_pages_target_url")
                    .table(Pages::Table)
                    .col(Pages::TargetUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    /// 回滚数据库迁移
    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Pages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Targets::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Targets {
    Table,
    Id,
    Url,
    Netloc,
    Parent,
    Depth,
    State,
    AttemptCount,
    IsOnion,
    FirstSeen,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    Kind,
    PayloadRef,
    Status,
    AttemptCount,
    MaxAttempts,
    ScheduledAt,
    LockToken,
    LockExpiresAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Pages {
    Table,
    Id,
    TargetUrl,
    Netloc,
    StatusCode,
    FetchOutcome,
    Title,
    Body,
    ContentRef,
    Artifacts,
    CaptureRef,
    Language,
    Subject,
    SubjectConfidence,
    CaptureState,
    ClassifyState,
    Version,
    FetchedAt,
    CreatedAt,
    UpdatedAt,
}
