// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobKind, JobStatus};
use crate::domain::repositories::frontier_repository::RepositoryError;
use crate::domain::repositories::job_repository::JobRepository;
use crate::infrastructure::database::entities::job as job_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 任务仓库实现
///
/// 基于SeaORM实现的队列表数据访问层。幂等合并由
/// (kind, payload_ref)唯一索引保证；租约获取在事务内
/// 以SKIP LOCKED行锁互斥并发工作器
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的任务仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<job_entity::Model> for Job {
    fn from(model: job_entity::Model) -> Self {
        Self {
            id: model.id,
            kind: model.kind.parse().unwrap_or_default(),
            payload_ref: model.payload_ref,
            status: model.status.parse().unwrap_or_default(),
            attempt_count: model.attempt_count,
            max_attempts: model.max_attempts,
            scheduled_at: model.scheduled_at,
            lock_token: model.lock_token,
            lock_expires_at: model.lock_expires_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Job> for job_entity::ActiveModel {
    fn from(job: Job) -> Self {
        Self {
            id: Set(job.id),
            kind: Set(job.kind.to_string()),
            payload_ref: Set(job.payload_ref),
            status: Set(job.status.to_string()),
            attempt_count: Set(job.attempt_count),
            max_attempts: Set(job.max_attempts),
            scheduled_at: Set(job.scheduled_at),
            lock_token: Set(job.lock_token),
            lock_expires_at: Set(job.lock_expires_at),
            created_at: Set(job.created_at),
            updated_at: Set(job.updated_at),
        }
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create_merged(&self, job: &Job) -> Result<bool, RepositoryError> {
        let model: job_entity::ActiveModel = job.clone().into();

        let result = job_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([job_entity::Column::Kind, job_entity::Column::PayloadRef])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn acquire_next(
        &self,
        kind: JobKind,
        worker_id: Uuid,
        visibility_timeout: chrono::Duration,
    ) -> Result<Option<Job>, RepositoryError> {
        let txn = self.db.begin().await?;

        let job = job_entity::Entity::find()
            .filter(job_entity::Column::Kind.eq(kind.to_string()))
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .filter(
                Condition::any()
                    .add(job_entity::Column::ScheduledAt.is_null())
                    .add(job_entity::Column::ScheduledAt.lte(Utc::now())),
            )
            .order_by_asc(job_entity::Column::CreatedAt)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?;

        if let Some(job) = job {
            let mut active: job_entity::ActiveModel = job.into();
            active.status = Set(JobStatus::Leased.to_string());
            active.lock_token = Set(Some(worker_id));
            active.lock_expires_at = Set(Some((Utc::now() + visibility_timeout).into()));
            let current_attempt = *active.attempt_count.as_ref();
            active.attempt_count = Set(current_attempt + 1);
            active.updated_at = Set(Utc::now().into());

            let updated = active.update(&txn).await?;
            txn.commit().await?;

            return Ok(Some(updated.into()));
        }

        txn.commit().await?;
        Ok(None)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        job_entity::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn release(
        &self,
        id: Uuid,
        requeue_delay: chrono::Duration,
    ) -> Result<(), RepositoryError> {
        let not_before = Utc::now() + requeue_delay;

        job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(job_entity::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                job_entity::Column::LockExpiresAt,
                Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None),
            )
            .col_expr(
                job_entity::Column::ScheduledAt,
                Expr::value(Some(chrono::DateTime::<chrono::FixedOffset>::from(
                    not_before,
                ))),
            )
            .col_expr(
                job_entity::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(Utc::now())),
            )
            .filter(job_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn defer(
        &self,
        id: Uuid,
        requeue_delay: chrono::Duration,
    ) -> Result<(), RepositoryError> {
        let not_before = Utc::now() + requeue_delay;

        job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(job_entity::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                job_entity::Column::LockExpiresAt,
                Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None),
            )
            .col_expr(
                job_entity::Column::ScheduledAt,
                Expr::value(Some(chrono::DateTime::<chrono::FixedOffset>::from(
                    not_before,
                ))),
            )
            // 退还本次投递
            .col_expr(
                job_entity::Column::AttemptCount,
                Expr::col(job_entity::Column::AttemptCount).sub(1),
            )
            .filter(job_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn release_expired_leases(&self) -> Result<u64, RepositoryError> {
        let result = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(job_entity::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                job_entity::Column::LockExpiresAt,
                Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None),
            )
            .filter(job_entity::Column::Status.eq(JobStatus::Leased.to_string()))
            .filter(job_entity::Column::LockExpiresAt.lte(Utc::now()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

}
