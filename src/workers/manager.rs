// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::JobKind;
use crate::domain::repositories::frontier_repository::FrontierRepository;
use crate::domain::repositories::page_repository::PageRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::engines::traits::FetchEngine;
use crate::enrichment::{CaptureClient, ClassifierClient};
use crate::infrastructure::index::SearchIndexClient;
use crate::proxy::ProxyPoolManager;
use crate::queue::job_queue::JobQueue;
use crate::workers::enrich_worker::{EnrichWorker, EnrichWorkerConfig};
use crate::workers::fetch_worker::{FetchWorker, FetchWorkerConfig};
use crate::workers::index_worker::{IndexWorker, IndexWorkerConfig};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
///
/// 每种任务类型一个独立的工作器池，池之间只通过
/// 队列/前沿/页面仓库交互，不共享内存状态
pub struct WorkerManager<Q, F, P>
where
    Q: JobQueue + 'static,
    F: FrontierRepository + 'static,
    P: PageRepository + 'static,
{
    queue: Arc<Q>,
    frontier: Arc<F>,
    pages: Arc<P>,
    storage: Arc<dyn StorageRepository>,
    proxy_pool: Arc<ProxyPoolManager>,
    engine: Arc<dyn FetchEngine>,
    capture: Arc<CaptureClient>,
    classifier: Arc<ClassifierClient>,
    index_client: Arc<SearchIndexClient>,
    fetch_config: FetchWorkerConfig,
    enrich_config: EnrichWorkerConfig,
    index_config: IndexWorkerConfig,
    handles: Vec<JoinHandle<()>>,
}

impl<Q, F, P> WorkerManager<Q, F, P>
where
    Q: JobQueue + Send + Sync,
    F: FrontierRepository + Send + Sync,
    P: PageRepository + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<Q>,
        frontier: Arc<F>,
        pages: Arc<P>,
        storage: Arc<dyn StorageRepository>,
        proxy_pool: Arc<ProxyPoolManager>,
        engine: Arc<dyn FetchEngine>,
        capture: Arc<CaptureClient>,
        classifier: Arc<ClassifierClient>,
        index_client: Arc<SearchIndexClient>,
        fetch_config: FetchWorkerConfig,
        enrich_config: EnrichWorkerConfig,
        index_config: IndexWorkerConfig,
    ) -> Self {
        Self {
            queue,
            frontier,
            pages,
            storage,
            proxy_pool,
            engine,
            capture,
            classifier,
            index_client,
            fetch_config,
            enrich_config,
            index_config,
            handles: Vec::new(),
        }
    }

    /// 启动各类型的工作器池
    ///
    /// # 参数
    ///
    /// * `fetch` - 抓取工作器数量
    /// * `detect` - 分类工作器数量
    /// * `enrich` - 捕获工作器数量
    /// * `index` - 索引工作器数量
    pub async fn start_workers(&mut self, fetch: usize, detect: usize, enrich: usize, index: usize) {
        for _ in 0..fetch {
            let worker = FetchWorker::new(
                self.queue.clone(),
                self.frontier.clone(),
                self.pages.clone(),
                self.storage.clone(),
                self.proxy_pool.clone(),
                self.engine.clone(),
                self.fetch_config.clone(),
            );
            self.handles.push(tokio::spawn(async move {
                worker.run().await;
            }));
        }

        for kind in [JobKind::Detect, JobKind::Enrich] {
            let count = match kind {
                JobKind::Detect => detect,
                _ => enrich,
            };
            for _ in 0..count {
                let worker = EnrichWorker::new(
                    self.queue.clone(),
                    self.pages.clone(),
                    self.storage.clone(),
                    self.capture.clone(),
                    self.classifier.clone(),
                    kind,
                    self.enrich_config.clone(),
                );
                self.handles.push(tokio::spawn(async move {
                    worker.run().await;
                }));
            }
        }

        for _ in 0..index {
            let worker = IndexWorker::new(
                self.queue.clone(),
                self.pages.clone(),
                self.index_client.clone(),
                self.index_config.clone(),
            );
            self.handles.push(tokio::spawn(async move {
                worker.run().await;
            }));
        }

        info!(
            "Started worker pools: fetch={}, detect={}, enrich={}, index={}",
            fetch, detect, enrich, index
        );
    }

    /// 等待关闭信号并关闭工作进程
    ///
    /// 监听关闭信号并优雅地关闭所有工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        info!("Shutting down workers...");
        for handle in &self.handles {
            handle.abort();
        }

        info!("Workers shut down successfully");
    }
}
