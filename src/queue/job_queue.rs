// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobKind};
use crate::domain::repositories::job_repository::JobRepository;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] crate::domain::repositories::frontier_repository::RepositoryError),
}

/// 任务队列特质
///
/// 按类型分区的持久化队列。同一类型内至少一次投递：
/// 租约到期未ack的任务重新可见，不会静默丢失；
/// 处理函数必须幂等（前沿与页面的变更都是按键且单调的）
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队任务
    ///
    /// 幂等键(kind, payload_ref)已在队列中时本次入队被合并
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 入队成功
    /// * `Ok(false)` - 已合并，无新任务产生
    async fn enqueue(&self, job: Job) -> Result<bool, QueueError>;

    /// 出队一个指定类型的任务
    ///
    /// 返回的任务持有可见性超时租约
    async fn dequeue(&self, kind: JobKind, worker_id: Uuid) -> Result<Option<Job>, QueueError>;

    /// 确认任务完成（删除）
    async fn ack(&self, job: &Job) -> Result<(), QueueError>;

    /// 任务处理失败，退避后重新投递
    async fn nack(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError>;

    /// 推迟任务且不消耗投递预算（代理池暂时耗尽等情况）
    async fn defer(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError>;
}

/// PostgreSQL任务队列实现
pub struct PostgresJobQueue<R: JobRepository> {
    /// 任务仓库
    repository: Arc<R>,
    /// 可见性超时
    visibility_timeout: chrono::Duration,
}

impl<R: JobRepository> PostgresJobQueue<R> {
    /// 创建新的PostgreSQL任务队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 任务仓库
    /// * `visibility_timeout` - 租约时长
    pub fn new(repository: Arc<R>, visibility_timeout: chrono::Duration) -> Self {
        Self {
            repository,
            visibility_timeout,
        }
    }
}

#[async_trait]
impl<R: JobRepository> JobQueue for PostgresJobQueue<R> {
    async fn enqueue(&self, job: Job) -> Result<bool, QueueError> {
        let inserted = self.repository.create_merged(&job).await?;
        Ok(inserted)
    }

    async fn dequeue(&self, kind: JobKind, worker_id: Uuid) -> Result<Option<Job>, QueueError> {
        let job = self
            .repository
            .acquire_next(kind, worker_id, self.visibility_timeout)
            .await?;
        Ok(job)
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        self.repository.delete(job.id).await?;
        Ok(())
    }

    async fn nack(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError> {
        self.repository.release(job.id, requeue_delay).await?;
        Ok(())
    }

    async fn defer(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError> {
        self.repository.defer(job.id, requeue_delay).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, job: Job) -> Result<bool, QueueError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(&self, kind: JobKind, worker_id: Uuid) -> Result<Option<Job>, QueueError> {
        (**self).dequeue(kind, worker_id).await
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        (**self).ack(job).await
    }

    async fn nack(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError> {
        (**self).nack(job, requeue_delay).await
    }

    async fn defer(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError> {
        (**self).defer(job, requeue_delay).await
    }
}
