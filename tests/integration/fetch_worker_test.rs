use crate::helpers::memory::{InMemoryFrontier, InMemoryJobQueue, InMemoryPageRepo};
use crate::helpers::{test_fetch_config, StubEngine};
use onioncrawl::domain::models::job::{Job, JobKind};
use onioncrawl::domain::models::target::{Target, TargetState};
use onioncrawl::domain::repositories::frontier_repository::FrontierRepository;
use onioncrawl::engines::traits::FetchEngine;
use onioncrawl::infrastructure::storage::InMemoryStorage;
use onioncrawl::proxy::{ProxyPoolConfig, ProxyPoolManager};
use onioncrawl::queue::job_queue::JobQueue;
use onioncrawl::workers::fetch_worker::{FetchWorker, FetchWorkerConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const SEED: &str = "http://expyuzz4wqqyqhjn.onion/";
const CHILD_ONION: &str =
    "http://vww6ybal4bd7szmgncyruucpgfkqahzddi37ktceo3ah7ngmcopnpyyd.onion/";
const CHILD_CLEAR: &str = "https://example.com/page";

struct Fixture {
    queue: Arc<InMemoryJobQueue>,
    frontier: Arc<InMemoryFrontier>,
    pages: Arc<InMemoryPageRepo>,
    pool: Arc<ProxyPoolManager>,
}

impl Fixture {
    fn new(endpoints: Vec<String>) -> Self {
        Self {
            queue: Arc::new(InMemoryJobQueue::new()),
            frontier: Arc::new(InMemoryFrontier::new()),
            pages: Arc::new(InMemoryPageRepo::new()),
            pool: Arc::new(ProxyPoolManager::new(
                endpoints,
                ProxyPoolConfig {
                    // 测试中不关心隔离策略，阈值拉高避免干扰
                    failure_threshold: 100,
                    quarantine_cooldown: Duration::from_secs(300),
                },
            )),
        }
    }

    async fn seed(&self, url: &str, max_fetch_attempts: i32) {
        let target = Target::discovered(
            url.to_string(),
            "expyuzz4wqqyqhjn.onion".to_string(),
            None,
            0,
            true,
        );
        self.frontier.register(&target).await.unwrap();
        self.frontier
            .mark(url, TargetState::Queued, 0)
            .await
            .unwrap();
        self.queue
            .enqueue(Job::new(JobKind::Fetch, url.to_string(), max_fetch_attempts))
            .await
            .unwrap();
    }

    async fn run_worker(&self, engine: Arc<dyn FetchEngine>, config: FetchWorkerConfig, ms: u64) {
        let worker = FetchWorker::new(
            self.queue.clone(),
            self.frontier.clone(),
            self.pages.clone(),
            Arc::new(InMemoryStorage::new()),
            self.pool.clone(),
            engine,
            config,
        );
        let handle = tokio::spawn(async move { worker.run().await });
        tokio::time::sleep(Duration::from_millis(ms)).await;
        handle.abort();
    }
}

fn page_html() -> String {
    format!(
        r#"<html><head><title>Directory</title></head><body>
            <a href="{}">onion</a>
            <a href="{}">clearnet</a>
            <p>contact admin@example.com</p>
            <p>donate 1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa</p>
        </body></html>"#,
        CHILD_ONION, CHILD_CLEAR
    )
}

#[tokio::test]
async fn crawl_flow_extracts_registers_and_enqueues() {
    let fixture = Fixture::new(vec!["127.0.0.1:9050".to_string()]);
    fixture.seed(SEED, 3).await;

    let engine = Arc::new(StubEngine::html(&page_html()));
    fixture
        .run_worker(engine, test_fetch_config(1, 3), 800)
        .await;

    // 种子与两个子目标全部抓取完成
    for url in [SEED, CHILD_ONION, CHILD_CLEAR] {
        let target = fixture.frontier.snapshot(url).unwrap();
        assert_eq!(target.state, TargetState::Fetched, "target {}", url);
    }

    // 抓取队列排空，每个页面各有一个enrich与detect任务
    assert!(fixture.queue.jobs_of_kind(JobKind::Fetch).is_empty());
    assert_eq!(fixture.queue.jobs_of_kind(JobKind::Enrich).len(), 3);
    assert_eq!(fixture.queue.jobs_of_kind(JobKind::Detect).len(), 3);

    let pages = fixture.pages.all();
    assert_eq!(pages.len(), 3);

    let seed_page = pages.iter().find(|p| p.target_url == SEED).unwrap();
    assert_eq!(seed_page.title.as_deref(), Some("Directory"));
    assert!(seed_page.artifacts.emails.contains("admin@example.com"));
    assert_eq!(seed_page.artifacts.links.len(), 2);
    assert!(seed_page.content_ref.is_some());

    // 子目标携带父标识符与深度
    let child = fixture.frontier.snapshot(CHILD_ONION).unwrap();
    assert_eq!(child.parent.as_deref(), Some(SEED));
    assert_eq!(child.depth, 1);
    assert!(child.is_onion);
}

#[tokio::test]
async fn links_beyond_depth_cap_are_recorded_but_never_queued() {
    let fixture = Fixture::new(vec!["127.0.0.1:9050".to_string()]);
    fixture.seed(SEED, 3).await;

    let engine = Arc::new(StubEngine::html(&page_html()));
    // max_depth = 0：种子本身可抓，发现的链接全部超出上限
    fixture
        .run_worker(engine, test_fetch_config(0, 3), 500)
        .await;

    assert_eq!(
        fixture.frontier.snapshot(SEED).unwrap().state,
        TargetState::Fetched
    );

    // 超深目标登记在册（来源可查）但停留在discovered
    let child = fixture.frontier.snapshot(CHILD_ONION).unwrap();
    assert_eq!(child.state, TargetState::Discovered);

    assert!(fixture.queue.jobs_of_kind(JobKind::Fetch).is_empty());
    assert_eq!(fixture.pages.all().len(), 1);
}

#[tokio::test]
async fn exhausted_target_goes_dead_and_is_never_requeued() {
    let fixture = Fixture::new(vec!["127.0.0.1:9050".to_string()]);
    fixture.seed(SEED, 2).await;

    let engine = Arc::new(StubEngine::failing());
    let calls = {
        let engine = engine.clone();
        fixture
            .run_worker(engine.clone(), test_fetch_config(1, 2), 800)
            .await;
        engine.calls.load(Ordering::SeqCst)
    };

    let target = fixture.frontier.snapshot(SEED).unwrap();
    assert_eq!(target.state, TargetState::Dead);
    assert_eq!(target.attempt_count, 2);

    // 预算耗尽后任务被删除，不再有自动重试
    assert_eq!(fixture.queue.len(), 0);
    assert_eq!(calls, 2);
    assert!(fixture.pages.all().is_empty());
}

#[tokio::test]
async fn proxy_exhaustion_defers_without_charging_the_budget() {
    // 空代理池：任务被推迟而不是失败
    let fixture = Fixture::new(Vec::new());
    fixture.seed(SEED, 3).await;

    let engine = Arc::new(StubEngine::html("<html></html>"));
    let calls = {
        let engine = engine.clone();
        fixture
            .run_worker(engine.clone(), test_fetch_config(1, 3), 300)
            .await;
        engine.calls.load(Ordering::SeqCst)
    };

    assert_eq!(calls, 0);

    let jobs = fixture.queue.jobs_of_kind(JobKind::Fetch);
    assert_eq!(jobs.len(), 1);
    // 300ms内任务被推迟了数十次；若每次推迟都计入预算，
    // 计数早已远超上限且目标已死。退还语义下至多残留
    // 一次进行中的租约计数
    assert!(jobs[0].attempt_count <= 1);

    let target = fixture.frontier.snapshot(SEED).unwrap();
    assert_ne!(target.state, TargetState::Dead);
    assert_ne!(target.state, TargetState::Failed);
}
