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
use crate::domain::models::page::{EnrichmentKind, EnrichmentState, Page};
use crate::domain::repositories::frontier_repository::RepositoryError;
use crate::domain::repositories::page_repository::{EnrichmentResult, PageRepository};
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::enrichment::{CaptureClient, ClassifierClient, EnrichError};
use crate::queue::job_queue::JobQueue;
use crate::utils::retry_policy::RetryPolicy;

/// 版本守卫冲突的重读上限
const ATTACH_RETRY_LIMIT: u32 = 5;

/// 富化工作器配置
#[derive(Clone)]
pub struct EnrichWorkerConfig {
    /// 富化调用的重试策略（线性退避）
    pub retry_policy: RetryPolicy,
    /// 索引任务的投递预算
    pub index_max_attempts: i32,
    /// 队列空闲时的轮询间隔
    pub idle_poll: Duration,
}

/// 富化工作器
///
/// 按任务类型分发到外部服务：enrich任务走视觉捕获，
/// detect任务走语言/主题分类。每种类型独立超时、独立
/// 重试预算；预算耗尽只把该类型记为失败，不阻塞其他
/// 类型也不使页面整体失败。所有必需类型到达终态后
/// 入队一次索引任务（幂等合并）。
pub struct EnrichWorker<Q, P>
where
    Q: JobQueue,
    P: PageRepository,
{
    queue: Arc<Q>,
    pages: Arc<P>,
    storage: Arc<dyn StorageRepository>,
    capture: Arc<CaptureClient>,
    classifier: Arc<ClassifierClient>,
    kind: JobKind,
    config: EnrichWorkerConfig,
    worker_id: Uuid,
}

impl<Q, P> EnrichWorker<Q, P>
where
    Q: JobQueue,
    P: PageRepository,
{
    /// 创建新的富化工作器实例
    ///
    /// # 参数
    ///
    /// * `kind` - 消费的任务类型（Enrich或Detect）
    pub fn new(
        queue: Arc<Q>,
        pages: Arc<P>,
        storage: Arc<dyn StorageRepository>,
        capture: Arc<CaptureClient>,
        classifier: Arc<ClassifierClient>,
        kind: JobKind,
        config: EnrichWorkerConfig,
    ) -> Self {
        debug_assert!(matches!(kind, JobKind::Enrich | JobKind::Detect));
        Self {
            queue,
            pages,
            storage,
            capture,
            classifier,
            kind,
            config,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行富化工作器
    pub async fn run(&self) {
        info!("Enrich worker {} ({}) started", self.worker_id, self.kind);

        loop {
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        sleep(self.config.idle_poll).await;
                    }
                }
                Err(e) => {
                    error!("Error processing {} job: {}", self.kind, e);
                    sleep(self.config.idle_poll).await;
                }
            }
        }
    }

    async fn process_next_job(&self) -> Result<bool> {
        let job_opt = self.queue.dequeue(self.kind, self.worker_id).await?;

        if let Some(job) = job_opt {
            self.process_job(job).await?;
            return Ok(true);
        }

        Ok(false)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, page = %job.payload_ref, kind = %self.kind))]
    async fn process_job(&self, job: Job) -> Result<()> {
        let Ok(page_id) = Uuid::parse_str(&job.payload_ref) else {
            warn!("Enrichment job carries malformed page id, dropping");
            self.queue.ack(&job).await?;
            return Ok(());
        };

        let Some(page) = self.pages.find_by_id(page_id).await? else {
            warn!("Enrichment job references unknown page, dropping");
            self.queue.ack(&job).await?;
            return Ok(());
        };

        let kind = self.enrichment_kind();

        // 重投递的任务可能撞上已终结的富化类型，幂等放行
        if page.enrichment_state(kind) != EnrichmentState::Pending {
            self.enqueue_index_if_terminal(page_id).await?;
            self.queue.ack(&job).await?;
            return Ok(());
        }

        match self.perform(&page, kind).await {
            Ok(Some(result)) => {
                self.attach_with_retry(page_id, kind, EnrichmentState::Done, Some(result))
                    .await?;
                counter!("enrichment_total", "kind" => kind.to_string(), "outcome" => "done")
                    .increment(1);
                self.enqueue_index_if_terminal(page_id).await?;
                self.queue.ack(&job).await?;
            }
            Ok(None) => {
                // 无可富化的素材，直接记为失败终态，不消耗服务调用
                self.attach_with_retry(page_id, kind, EnrichmentState::Failed, None)
                    .await?;
                self.enqueue_index_if_terminal(page_id).await?;
                self.queue.ack(&job).await?;
            }
            Err(e) => {
                warn!(
                    "Enrichment call failed (attempt {}/{}): {}",
                    job.attempt_count, job.max_attempts, e
                );

                if job.exhausted() {
                    // 重试预算耗尽：该类型永久失败，页面带着部分富化继续
                    self.attach_with_retry(page_id, kind, EnrichmentState::Failed, None)
                        .await?;
                    counter!("enrichment_total", "kind" => kind.to_string(), "outcome" => "failed")
                        .increment(1);
                    self.enqueue_index_if_terminal(page_id).await?;
                    self.queue.ack(&job).await?;
                } else {
                    let backoff = self
                        .config
                        .retry_policy
                        .calculate_backoff(job.attempt_count as u32);
                    self.queue
                        .nack(&job, chrono::Duration::milliseconds(backoff.as_millis() as i64))
                        .await?;
                }
            }
        }

        Ok(())
    }

    fn enrichment_kind(&self) -> EnrichmentKind {
        match self.kind {
            JobKind::Detect => EnrichmentKind::Classify,
            _ => EnrichmentKind::Capture,
        }
    }

    /// 调用对应的外部服务
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(result))` - 富化成功
    /// * `Ok(None)` - 页面没有可富化的素材
    /// * `Err(EnrichError)` - 服务调用失败，可重试
    async fn perform(
        &self,
        page: &Page,
        kind: EnrichmentKind,
    ) -> Result<Option<EnrichmentResult>, EnrichError> {
        match kind {
            EnrichmentKind::Capture => {
                let image = self.capture.capture(&page.target_url).await?;
                let key = format!("captures/{}.png", page.id);
                self.storage
                    .save(&key, &image)
                    .await
                    .map_err(|e| EnrichError::Service(e.to_string()))?;
                Ok(Some(EnrichmentResult::Capture { capture_ref: key }))
            }
            EnrichmentKind::Classify => {
                let Some(text) = page.body.as_deref().or(page.title.as_deref()) else {
                    return Ok(None);
                };
                let classification = self.classifier.classify(text).await?;
                Ok(Some(EnrichmentResult::Classify {
                    language: classification.locale,
                    subject: classification.label,
                    confidence: classification.confidence,
                }))
            }
        }
    }

    /// 版本守卫的读-改-写
    ///
    /// 两种富化类型并发写同一页面时落后者观察到Conflict，
    /// 重读最新版本后重试，对调用方透明
    async fn attach_with_retry(
        &self,
        page_id: Uuid,
        kind: EnrichmentKind,
        state: EnrichmentState,
        result: Option<EnrichmentResult>,
    ) -> Result<()> {
        for _ in 0..ATTACH_RETRY_LIMIT {
            let Some(page) = self.pages.find_by_id(page_id).await? else {
                anyhow::bail!("page {} vanished during enrichment", page_id);
            };

            match self
                .pages
                .attach_enrichment(page_id, kind, state, result.clone(), page.version)
                .await
            {
                Ok(()) => return Ok(()),
                Err(RepositoryError::Conflict) => {
                    counter!("page_version_conflicts_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!(
            "version conflict persisted after {} retries for page {}",
            ATTACH_RETRY_LIMIT,
            page_id
        )
    }

    /// 页面到达富化终态时入队一次索引任务
    ///
    /// 并发到达终态的两个工作器都会尝试入队，
    /// 幂等合并保证每个状态转换批次只产生一个索引任务
    async fn enqueue_index_if_terminal(&self, page_id: Uuid) -> Result<()> {
        let Some(page) = self.pages.find_by_id(page_id).await? else {
            return Ok(());
        };

        if page.enrichment_terminal() {
            self.queue
                .enqueue(Job::new(
                    JobKind::Index,
                    page_id.to_string(),
                    self.config.index_max_attempts,
                ))
                .await?;
        }

        Ok(())
    }
}
