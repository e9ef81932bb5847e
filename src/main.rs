// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::routing::{get, post};
use axum::{Extension, Router};
use onioncrawl::config::settings::Settings;
use onioncrawl::engines::socks_engine::SocksFetchEngine;
use onioncrawl::engines::traits::FetchEngine;
use onioncrawl::enrichment::{CaptureClient, ClassifierClient};
use onioncrawl::infrastructure::database::connection;
use onioncrawl::infrastructure::index::SearchIndexClient;
use onioncrawl::infrastructure::repositories::frontier_repo_impl::FrontierRepositoryImpl;
use onioncrawl::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use onioncrawl::infrastructure::repositories::page_repo_impl::PageRepositoryImpl;
use onioncrawl::infrastructure::storage::LocalStorage;
use onioncrawl::presentation::handlers::seed_handler::{self, MaxFetchAttempts};
use onioncrawl::presentation::routes;
use onioncrawl::proxy::{ProxyPoolConfig, ProxyPoolManager};
use onioncrawl::queue::job_queue::PostgresJobQueue;
use onioncrawl::queue::scheduler::QueueScheduler;
use onioncrawl::utils::retry_policy::RetryPolicy;
use onioncrawl::utils::telemetry;
use onioncrawl::workers::enrich_worker::EnrichWorkerConfig;
use onioncrawl::workers::fetch_worker::FetchWorkerConfig;
use onioncrawl::workers::index_worker::IndexWorkerConfig;
use onioncrawl::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use migration::{Migrator, MigratorTrait};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务。
/// 数据库不可达属于唯一的致命条件：进程拒绝启动，
/// 而不是以不一致的降级模式运行
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting onioncrawl...");

    // Initialize Prometheus Metrics
    onioncrawl::infrastructure::metrics::init_metrics();

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. Connect to database (fatal on failure)
    let db = connection::create_pool(&settings.database).await?;
    let db = Arc::new(db);
    info!("Database connection established");

    // Run database migrations
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Initialize repositories and queue
    let frontier = Arc::new(FrontierRepositoryImpl::new(db.clone()));
    let job_repo = Arc::new(JobRepositoryImpl::new(db.clone()));
    let pages = Arc::new(PageRepositoryImpl::new(db.clone()));
    let queue = Arc::new(PostgresJobQueue::new(
        job_repo.clone(),
        chrono::Duration::seconds(settings.queue.visibility_timeout_secs as i64),
    ));

    // 5. Initialize proxy pool
    let proxy_pool = Arc::new(ProxyPoolManager::new(
        settings.proxy.endpoints.clone(),
        ProxyPoolConfig {
            failure_threshold: settings.proxy.failure_threshold,
            quarantine_cooldown: Duration::from_secs(settings.proxy.quarantine_cooldown_secs),
        },
    ));
    info!("Proxy pool initialized with {} endpoints", proxy_pool.len());

    // 6. Initialize engine, storage and external service clients
    let engine: Arc<dyn FetchEngine> =
        Arc::new(SocksFetchEngine::new(settings.crawler.user_agent.clone()));
    let storage = Arc::new(LocalStorage::new(settings.storage.local_path.clone()));
    let capture = Arc::new(CaptureClient::new(
        settings.enrichment.capture_url.clone(),
        Duration::from_secs(settings.enrichment.capture_timeout_secs),
    ));
    let classifier = Arc::new(ClassifierClient::new(
        settings.enrichment.classify_url.clone(),
        Duration::from_secs(settings.enrichment.classify_timeout_secs),
    ));
    let index_client = Arc::new(SearchIndexClient::new(
        settings.index.url.clone(),
        settings.index.index_name.clone(),
        Duration::from_secs(settings.index.timeout_secs),
    ));

    // 7. Start queue maintenance scheduler
    let scheduler = QueueScheduler::new(
        job_repo.clone(),
        Duration::from_secs(settings.queue.sweep_interval_secs),
    );
    let _scheduler_handle = scheduler.start();

    // 8. Start workers
    let idle_poll = Duration::from_secs(settings.queue.idle_poll_secs);
    let fetch_config = FetchWorkerConfig {
        max_depth: settings.crawler.max_depth,
        max_fetch_attempts: settings.crawler.max_fetch_attempts,
        connect_timeout: Duration::from_secs(settings.crawler.connect_timeout_secs),
        request_timeout: Duration::from_secs(settings.crawler.request_timeout_secs),
        enrich_max_attempts: settings.enrichment.max_attempts,
        index_max_attempts: 5,
        proxy_backoff: settings.crawler.proxy_backoff(),
        content_backoff: settings.crawler.content_backoff(),
        idle_poll,
        proxy_defer: Duration::from_secs(15),
    };
    let enrich_config = EnrichWorkerConfig {
        retry_policy: RetryPolicy::linear(
            settings.enrichment.max_attempts as u32,
            Duration::from_secs(settings.enrichment.retry_delay_secs),
        ),
        index_max_attempts: 5,
        idle_poll,
    };
    let index_config = IndexWorkerConfig {
        retry_delay: Duration::from_secs(30),
        idle_poll,
    };

    let mut worker_manager = WorkerManager::new(
        queue.clone(),
        frontier.clone(),
        pages.clone(),
        storage,
        proxy_pool,
        engine,
        capture,
        classifier,
        index_client,
        fetch_config,
        enrich_config,
        index_config,
    );
    worker_manager
        .start_workers(
            settings.workers.fetch,
            settings.workers.detect,
            settings.workers.enrich,
            settings.workers.index,
        )
        .await;

    // 9. Start HTTP server
    let app = Router::new()
        .route("/health", get(routes::health_check))
        .route("/v1/version", get(routes::version))
        .route(
            "/v1/seeds",
            post(seed_handler::submit_seeds::<
                FrontierRepositoryImpl,
                PostgresJobQueue<JobRepositoryImpl>,
            >),
        )
        .route(
            "/v1/targets",
            get(seed_handler::get_target::<FrontierRepositoryImpl>),
        )
        .layer(Extension(frontier))
        .layer(Extension(queue))
        .layer(Extension(MaxFetchAttempts(settings.crawler.max_fetch_attempts)))
        .layer(Extension(settings.clone()));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = worker_manager.wait_for_shutdown() => {}
    }

    Ok(())
}
