// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::job_repository::JobRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

/// 队列维护调度器
///
/// 可见性超时是系统唯一的取消机制：工作器在dequeue后崩溃
/// 或卡死，其租约到期后任务由这里重新置为可见，保证任务
/// 不会静默丢失。实际的任务获取由各工作器主动拉取。
pub struct QueueScheduler<R: JobRepository + 'static> {
    /// 任务仓库
    repository: Arc<R>,
    /// 巡检间隔
    sweep_interval: Duration,
}

impl<R: JobRepository + 'static> QueueScheduler<R> {
    /// 创建新的调度器实例
    pub fn new(repository: Arc<R>, sweep_interval: Duration) -> Self {
        Self {
            repository,
            sweep_interval,
        }
    }

    /// 启动调度器后台任务
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn start(&self) -> JoinHandle<()> {
        let repository = self.repository.clone();
        let sweep_interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut interval = interval(sweep_interval);

            loop {
                interval.tick().await;

                match repository.release_expired_leases().await {
                    Ok(count) => {
                        if count > 0 {
                            info!("Released {} expired job leases", count);
                            metrics::counter!("queue_expired_leases_total").increment(count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to release expired leases: {}", e);
                    }
                }
            }
        })
    }
}
