// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobKind};
use crate::domain::repositories::frontier_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 任务仓库特质
///
/// 队列表的数据访问接口。行只在pending或leased期间存在，
/// ack与预算耗尽都会删除行
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 插入任务，幂等键冲突时静默合并
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 插入成功
    /// * `Ok(false)` - (kind, payload_ref)已在队列中，本次入队为无操作
    async fn create_merged(&self, job: &Job) -> Result<bool, RepositoryError>;

    /// 租约获取下一个可投递任务
    ///
    /// 原子地将任务置为leased并设置可见性超时，
    /// 并发工作器间通过行锁SKIP LOCKED互斥
    async fn acquire_next(
        &self,
        kind: JobKind,
        worker_id: Uuid,
        visibility_timeout: chrono::Duration,
    ) -> Result<Option<Job>, RepositoryError>;

    /// 删除任务（ack或预算耗尽）
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// 释放租约并设置退避（nack）
    async fn release(&self, id: Uuid, requeue_delay: chrono::Duration)
        -> Result<(), RepositoryError>;

    /// 推迟任务且不消耗投递预算
    ///
    /// 与release的区别：本次投递从计数中退还。
    /// 代理池暂时耗尽属于这种情况，不是任务本身的失败
    async fn defer(&self, id: Uuid, requeue_delay: chrono::Duration)
        -> Result<(), RepositoryError>;

    /// 将租约过期的任务重新置为pending
    ///
    /// 可见性超时是唯一的取消机制：卡死的抓取在超时后
    /// 被放弃并重新投递
    async fn release_expired_leases(&self) -> Result<u64, RepositoryError>;
}
