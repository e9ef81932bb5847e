// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::job::{Job, JobKind};
use crate::domain::repositories::page_repository::PageRepository;
use crate::infrastructure::index::{PageProjection, SearchIndexClient};
use crate::queue::job_queue::JobQueue;

/// 索引工作器配置
#[derive(Clone)]
pub struct IndexWorkerConfig {
    /// 投递失败的重试间隔
    pub retry_delay: Duration,
    /// 队列空闲时的轮询间隔
    pub idle_poll: Duration,
}

/// 索引工作器
///
/// 存储写入器的投递末端：从页面记录构建面向搜索的投影，
/// 按标识符upsert到索引协作方。投递语义为至少一次，
/// 重复投递由协作方的按键upsert吸收，不产生重复条目
pub struct IndexWorker<Q, P>
where
    Q: JobQueue,
    P: PageRepository,
{
    queue: Arc<Q>,
    pages: Arc<P>,
    index: Arc<SearchIndexClient>,
    config: IndexWorkerConfig,
    worker_id: Uuid,
}

impl<Q, P> IndexWorker<Q, P>
where
    Q: JobQueue,
    P: PageRepository,
{
    /// 创建新的索引工作器实例
    pub fn new(
        queue: Arc<Q>,
        pages: Arc<P>,
        index: Arc<SearchIndexClient>,
        config: IndexWorkerConfig,
    ) -> Self {
        Self {
            queue,
            pages,
            index,
            config,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行索引工作器
    pub async fn run(&self) {
        info!("Index worker {} started", self.worker_id);

        loop {
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        sleep(self.config.idle_poll).await;
                    }
                }
                Err(e) => {
                    error!("Error processing index job: {}", e);
                    sleep(self.config.idle_poll).await;
                }
            }
        }
    }

    async fn process_next_job(&self) -> Result<bool> {
        let job_opt = self.queue.dequeue(JobKind::Index, self.worker_id).await?;

        if let Some(job) = job_opt {
            self.process_job(job).await?;
            return Ok(true);
        }

        Ok(false)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, page = %job.payload_ref))]
    async fn process_job(&self, job: Job) -> Result<()> {
        let Ok(page_id) = Uuid::parse_str(&job.payload_ref) else {
            warn!("Index job carries malformed page id, dropping");
            self.queue.ack(&job).await?;
            return Ok(());
        };

        let Some(page) = self.pages.find_by_id(page_id).await? else {
            warn!("Index job references unknown page, dropping");
            self.queue.ack(&job).await?;
            return Ok(());
        };

        let is_onion = page.netloc.ends_with(".onion");
        let projection = PageProjection::from_page(&page, is_onion);

        match self.index.upsert(page_id, &projection).await {
            Ok(()) => {
                counter!("index_delivery_total", "outcome" => "delivered").increment(1);
                self.queue.ack(&job).await?;
            }
            Err(e) => {
                warn!(
                    "Index delivery failed (attempt {}/{}): {}",
                    job.attempt_count, job.max_attempts, e
                );

                if job.exhausted() {
                    // 投递预算耗尽：放弃本轮，页面数据仍在，
                    // 下一次富化状态转换会再次产生索引任务
                    counter!("index_delivery_total", "outcome" => "dropped").increment(1);
                    error!("Index delivery budget exhausted, giving up on this batch");
                    self.queue.ack(&job).await?;
                } else {
                    self.queue
                        .nack(
                            &job,
                            chrono::Duration::milliseconds(
                                self.config.retry_delay.as_millis() as i64
                            ),
                        )
                        .await?;
                }
            }
        }

        Ok(())
    }
}
