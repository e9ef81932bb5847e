// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use metrics::counter;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::models::job::{Job, JobKind};
use crate::domain::models::page::{Artifacts, FetchOutcome, Page};
use crate::domain::models::target::{RegisterOutcome, Target, TargetState};
use crate::domain::repositories::frontier_repository::FrontierRepository;
use crate::domain::repositories::page_repository::PageRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::extraction_service::ExtractionService;
use crate::engines::traits::{FetchEngine, FetchError, FetchRequest};
use crate::proxy::{ProxyOutcome, ProxyPoolManager};
use crate::queue::job_queue::JobQueue;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::text_encoding;
use crate::utils::url_utils;

/// 抓取工作器配置
#[derive(Clone)]
pub struct FetchWorkerConfig {
    /// 最大爬取深度
    pub max_depth: i32,
    /// 单个目标的最大抓取尝试次数
    pub max_fetch_attempts: i32,
    /// 连接超时
    pub connect_timeout: Duration,
    /// 请求总超时
    pub request_timeout: Duration,
    /// 富化任务的投递预算
    pub enrich_max_attempts: i32,
    /// 索引任务的投递预算
    pub index_max_attempts: i32,
    /// 代理故障退避曲线
    pub proxy_backoff: RetryPolicy,
    /// 内容故障退避曲线
    pub content_backoff: RetryPolicy,
    /// 队列空闲时的轮询间隔
    pub idle_poll: Duration,
    /// 代理池耗尽时的推迟时长
    pub proxy_defer: Duration,
}

/// 抓取工作器
///
/// 抓取任务的状态机：leased → fetching → {extracted, fetch-failed}。
/// 传输失败不在行内重试，统一通过nack退避后重投递，
/// 重试策略集中在一处。页面与富化任务双双落盘后才ack，
/// 避免崩溃丢失页面而任务已确认的空洞。
pub struct FetchWorker<Q, F, P>
where
    Q: JobQueue,
    F: FrontierRepository,
    P: PageRepository,
{
    queue: Arc<Q>,
    frontier: Arc<F>,
    pages: Arc<P>,
    storage: Arc<dyn StorageRepository>,
    proxy_pool: Arc<ProxyPoolManager>,
    engine: Arc<dyn FetchEngine>,
    config: FetchWorkerConfig,
    worker_id: Uuid,
}

impl<Q, F, P> FetchWorker<Q, F, P>
where
    Q: JobQueue,
    F: FrontierRepository,
    P: PageRepository,
{
    /// 创建新的抓取工作器实例
    pub fn new(
        queue: Arc<Q>,
        frontier: Arc<F>,
        pages: Arc<P>,
        storage: Arc<dyn StorageRepository>,
        proxy_pool: Arc<ProxyPoolManager>,
        engine: Arc<dyn FetchEngine>,
        config: FetchWorkerConfig,
    ) -> Self {
        Self {
            queue,
            frontier,
            pages,
            storage,
            proxy_pool,
            engine,
            config,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行抓取工作器
    pub async fn run(&self) {
        info!("Fetch worker {} started", self.worker_id);

        loop {
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        sleep(self.config.idle_poll).await;
                    }
                }
                Err(e) => {
                    error!("Error processing fetch job: {}", e);
                    sleep(self.config.idle_poll).await;
                }
            }
        }
    }

    async fn process_next_job(&self) -> Result<bool> {
        let job_opt = self.queue.dequeue(JobKind::Fetch, self.worker_id).await?;

        if let Some(job) = job_opt {
            self.process_job(job).await?;
            return Ok(true);
        }

        Ok(false)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, url = %job.payload_ref))]
    async fn process_job(&self, job: Job) -> Result<()> {
        let url = job.payload_ref.clone();

        let Some(target) = self.frontier.query(&url).await? else {
            warn!("Fetch job references unknown target, dropping");
            self.queue.ack(&job).await?;
            return Ok(());
        };

        // 重投递的任务可能撞上已终结的目标，幂等放行
        if matches!(target.state, TargetState::Dead | TargetState::Fetched) {
            self.queue.ack(&job).await?;
            return Ok(());
        }

        // 崩溃重放可能留下discovered状态的已入队目标
        if target.state == TargetState::Discovered {
            self.frontier
                .mark(&url, TargetState::Queued, target.attempt_count)
                .await?;
        }
        self.frontier
            .mark(&url, TargetState::Fetching, target.attempt_count)
            .await?;

        // 池暂时耗尽：推迟任务，不消耗目标的重试预算
        let Some(endpoint) = self.proxy_pool.acquire() else {
            info!("Proxy pool exhausted, deferring fetch job");
            self.queue.defer(&job, chrono_duration(self.config.proxy_defer)).await?;
            return Ok(());
        };

        let request = FetchRequest {
            url: url.clone(),
            proxy: Some(endpoint.address.clone()),
            connect_timeout: self.config.connect_timeout,
            request_timeout: self.config.request_timeout,
        };

        match self.engine.fetch(&request).await {
            Ok(response) => {
                self.proxy_pool.report(&endpoint, ProxyOutcome::Success);
                counter!("fetch_jobs_total", "outcome" => "success").increment(1);
                self.handle_response(&job, &target, response).await
            }
            Err(e) => {
                match &e {
                    FetchError::Transport(_) | FetchError::Timeout => {
                        self.proxy_pool.report(&endpoint, ProxyOutcome::Failure);
                    }
                    // 传输层已经送达，内容问题与端点健康无关
                    FetchError::Content(_) => {
                        self.proxy_pool.report(&endpoint, ProxyOutcome::Success);
                    }
                }
                counter!("fetch_jobs_total", "outcome" => e.outcome().to_string())
                    .increment(1);
                self.handle_fetch_failure(&job, &target, e).await
            }
        }
    }

    async fn handle_response(
        &self,
        job: &Job,
        target: &Target,
        response: crate::engines::traits::FetchResponse,
    ) -> Result<()> {
        let url = &job.payload_ref;
        let status = response.status_code as i32;
        info!("Fetch successful, status: {}", status);

        let enrichable = status == 200 && response.is_html() && !response.body.is_empty();

        let page = if enrichable {
            let text =
                text_encoding::decode_body(&response.body, response.content_type.as_deref());
            let base = Url::parse(url)
                .map_err(|e| anyhow::anyhow!("stored canonical url failed to parse: {}", e))?;

            let extraction = ExtractionService::extract(&base, &text);
            if extraction.artifacts.rejected_candidates > 0 {
                counter!("extraction_rejected_candidates_total")
                    .increment(extraction.artifacts.rejected_candidates as u64);
            }

            self.register_discovered_links(url, target.depth, &extraction.artifacts)
                .await?;

            let content_ref = self.store_raw_content(&response.body).await;

            Page::new(
                url.clone(),
                target.netloc.clone(),
                Some(status),
                FetchOutcome::Success,
                extraction.title,
                extraction.body,
                content_ref,
                extraction.artifacts,
            )
        } else {
            // 非200或非HTML响应也记录页面（来源可查），但不提取不富化
            Page::new(
                url.clone(),
                target.netloc.clone(),
                Some(status),
                FetchOutcome::Success,
                None,
                None,
                None,
                Artifacts::default(),
            )
        };

        // 崩溃重放时页面可能已存在，按键幂等
        let page_id = match self.pages.find_by_target_url(url).await? {
            Some(existing) => existing.id,
            None => {
                self.pages.save(&page).await?;
                page.id
            }
        };

        if enrichable {
            self.queue
                .enqueue(Job::new(
                    JobKind::Enrich,
                    page_id.to_string(),
                    self.config.enrich_max_attempts,
                ))
                .await?;
            self.queue
                .enqueue(Job::new(
                    JobKind::Detect,
                    page_id.to_string(),
                    self.config.enrich_max_attempts,
                ))
                .await?;
        } else {
            // 无需富化的页面直接交付索引
            self.queue
                .enqueue(Job::new(
                    JobKind::Index,
                    page_id.to_string(),
                    self.config.index_max_attempts,
                ))
                .await?;
        }

        self.frontier
            .mark(url, TargetState::Fetched, job.attempt_count)
            .await?;

        // 页面与后续任务均已落盘，此时才确认抓取任务
        self.queue.ack(job).await?;
        Ok(())
    }

    /// 注册提取出的链接并为新目标入队抓取任务
    ///
    /// 只有register返回New且深度在上限内的标识符才产生新任务；
    /// 超出深度的目标仍被记录（来源可查）但永不入队。
    /// 环状链接图由前沿唯一性约束自然消解。
    async fn register_discovered_links(
        &self,
        parent_url: &str,
        parent_depth: i32,
        artifacts: &Artifacts,
    ) -> Result<()> {
        let child_depth = parent_depth + 1;

        for link in &artifacts.links {
            if link.url == parent_url {
                continue;
            }

            let Some(canonical) = Url::parse(&link.url)
                .ok()
                .and_then(|u| url_utils::canonicalize(&u))
            else {
                continue;
            };

            let child = Target::discovered(
                canonical.url.clone(),
                canonical.netloc,
                Some(parent_url.to_string()),
                child_depth,
                canonical.is_onion,
            );

            let outcome = self.frontier.register(&child).await?;
            match outcome {
                RegisterOutcome::New => {
                    counter!("frontier_register_total", "outcome" => "new").increment(1);
                    if child_depth <= self.config.max_depth {
                        self.queue
                            .enqueue(Job::new(
                                JobKind::Fetch,
                                canonical.url.clone(),
                                self.config.max_fetch_attempts,
                            ))
                            .await?;
                        self.frontier
                            .mark(&canonical.url, TargetState::Queued, 0)
                            .await?;
                    }
                }
                RegisterOutcome::Duplicate => {
                    counter!("frontier_register_total", "outcome" => "duplicate").increment(1);
                }
            }
        }

        Ok(())
    }

    async fn handle_fetch_failure(
        &self,
        job: &Job,
        target: &Target,
        error: FetchError,
    ) -> Result<()> {
        let url = &job.payload_ref;
        let attempts = job.attempt_count;
        warn!(
            "Fetch failed (attempt {}/{}): {}",
            attempts, self.config.max_fetch_attempts, error
        );

        let policy = match &error {
            FetchError::Transport(_) | FetchError::Timeout => &self.config.proxy_backoff,
            FetchError::Content(_) => &self.config.content_backoff,
        };

        if attempts >= self.config.max_fetch_attempts {
            match &error {
                FetchError::Transport(_) | FetchError::Timeout => {
                    // 预算耗尽：目标死亡，以指标而非故障的形式浮出
                    self.frontier
                        .mark(url, TargetState::Failed, attempts)
                        .await?;
                    self.frontier.mark(url, TargetState::Dead, attempts).await?;
                    counter!("frontier_targets_dead_total").increment(1);
                    info!("Target exhausted its fetch budget, marked dead");
                }
                FetchError::Content(_) => {
                    // 内容始终无法处理：记录content-error页面留痕
                    let page = Page::new(
                        url.clone(),
                        target.netloc.clone(),
                        None,
                        error.outcome(),
                        None,
                        None,
                        None,
                        Artifacts::default(),
                    );
                    let page_id = match self.pages.find_by_target_url(url).await? {
                        Some(existing) => existing.id,
                        None => {
                            self.pages.save(&page).await?;
                            page.id
                        }
                    };
                    self.queue
                        .enqueue(Job::new(
                            JobKind::Index,
                            page_id.to_string(),
                            self.config.index_max_attempts,
                        ))
                        .await?;
                    self.frontier
                        .mark(url, TargetState::Fetched, attempts)
                        .await?;
                }
            }
            self.queue.ack(job).await?;
            return Ok(());
        }

        // 失败→重新入队，退避时间由对应曲线给出
        self.frontier
            .mark(url, TargetState::Failed, attempts)
            .await?;
        self.frontier
            .mark(url, TargetState::Queued, attempts)
            .await?;

        let backoff = policy.calculate_backoff(attempts as u32);
        self.queue.nack(job, chrono_duration(backoff)).await?;
        info!(
            "Scheduled fetch retry {}/{} in {:?}",
            attempts, self.config.max_fetch_attempts, backoff
        );
        Ok(())
    }

    /// 原始内容按sha-256内容寻址落入对象存储
    async fn store_raw_content(&self, body: &[u8]) -> Option<String> {
        let digest = hex::encode(Sha256::digest(body));
        let key = format!("content/{}/{}.html", &digest[..2], digest);

        match self.storage.save(&key, body).await {
            Ok(()) => Some(key),
            Err(e) => {
                // 对象存储失败不影响页面入库
                error!("Failed to store raw content: {}", e);
                None
            }
        }
    }
}

/// std Duration到chrono Duration的换算
fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}
