use crate::helpers::memory::{InMemoryJobQueue, InMemoryPageRepo};
use onioncrawl::domain::models::job::{Job, JobKind};
use onioncrawl::domain::models::page::{
    Artifacts, EnrichmentState, FetchOutcome, Page,
};
use onioncrawl::domain::repositories::page_repository::PageRepository;
use onioncrawl::enrichment::{CaptureClient, ClassifierClient};
use onioncrawl::infrastructure::index::SearchIndexClient;
use onioncrawl::infrastructure::storage::InMemoryStorage;
use onioncrawl::queue::job_queue::JobQueue;
use onioncrawl::utils::retry_policy::RetryPolicy;
use onioncrawl::workers::enrich_worker::{EnrichWorker, EnrichWorkerConfig};
use onioncrawl::workers::index_worker::{IndexWorker, IndexWorkerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "http://expyuzz4wqqyqhjn.onion/";

fn test_page() -> Page {
    Page::new(
        TARGET.to_string(),
        "expyuzz4wqqyqhjn.onion".to_string(),
        Some(200),
        FetchOutcome::Success,
        Some("Directory".to_string()),
        Some("an onion directory listing hidden services".to_string()),
        None,
        Artifacts::default(),
    )
}

fn enrich_config() -> EnrichWorkerConfig {
    EnrichWorkerConfig {
        retry_policy: RetryPolicy::linear(1, Duration::from_millis(1)),
        index_max_attempts: 3,
        idle_poll: Duration::from_millis(10),
    }
}

async fn run_enrich_workers(
    queue: Arc<InMemoryJobQueue>,
    pages: Arc<InMemoryPageRepo>,
    capture_url: String,
    classify_url: String,
    ms: u64,
) {
    let capture = Arc::new(CaptureClient::new(capture_url, Duration::from_secs(2)));
    let classifier = Arc::new(ClassifierClient::new(classify_url, Duration::from_secs(2)));
    let storage = Arc::new(InMemoryStorage::new());

    let mut handles = Vec::new();
    for kind in [JobKind::Enrich, JobKind::Detect] {
        let worker = EnrichWorker::new(
            queue.clone(),
            pages.clone(),
            storage.clone(),
            capture.clone(),
            classifier.clone(),
            kind,
            enrich_config(),
        );
        handles.push(tokio::spawn(async move { worker.run().await }));
    }

    tokio::time::sleep(Duration::from_millis(ms)).await;
    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn partial_enrichment_failure_still_reaches_terminal_state() {
    let capture_server = MockServer::start().await;
    let classify_server = MockServer::start().await;

    // 捕获服务持续失败，分类服务正常
    Mock::given(method("GET"))
        .and(path("/render.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&capture_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "label": "marketplace",
            "confidence": 0.87,
            "locale": "en"
        })))
        .mount(&classify_server)
        .await;

    let queue = Arc::new(InMemoryJobQueue::new());
    let pages = Arc::new(InMemoryPageRepo::new());

    let page = test_page();
    let page_id = page.id;
    pages.save(&page).await.unwrap();

    // 重试预算1：首次失败即耗尽
    queue
        .enqueue(Job::new(JobKind::Enrich, page_id.to_string(), 1))
        .await
        .unwrap();
    queue
        .enqueue(Job::new(JobKind::Detect, page_id.to_string(), 1))
        .await
        .unwrap();

    run_enrich_workers(
        queue.clone(),
        pages.clone(),
        capture_server.uri(),
        classify_server.uri(),
        600,
    )
    .await;

    let page = pages.find_by_id(page_id).await.unwrap().unwrap();

    // 一种类型永久失败、另一种成功：页面带部分结果到达终态
    assert_eq!(page.capture_state, EnrichmentState::Failed);
    assert_eq!(page.classify_state, EnrichmentState::Done);
    assert!(page.enrichment_terminal());
    assert_eq!(page.subject.as_deref(), Some("marketplace"));
    assert_eq!(page.language.as_deref(), Some("en"));
    assert!(page.capture_ref.is_none());
    // 两次版本守卫写入
    assert_eq!(page.version, 2);

    // 本转换批次恰好产生一个索引任务（幂等合并）
    assert_eq!(queue.jobs_of_kind(JobKind::Index).len(), 1);
    assert!(queue.jobs_of_kind(JobKind::Enrich).is_empty());
    assert!(queue.jobs_of_kind(JobKind::Detect).is_empty());
}

#[tokio::test]
async fn successful_enrichment_attaches_capture_and_classification() {
    let capture_server = MockServer::start().await;
    let classify_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/render.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
        .mount(&capture_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "label": "forum",
            "confidence": 0.91,
            "locale": "de"
        })))
        .mount(&classify_server)
        .await;

    let queue = Arc::new(InMemoryJobQueue::new());
    let pages = Arc::new(InMemoryPageRepo::new());

    let page = test_page();
    let page_id = page.id;
    pages.save(&page).await.unwrap();

    queue
        .enqueue(Job::new(JobKind::Enrich, page_id.to_string(), 3))
        .await
        .unwrap();
    queue
        .enqueue(Job::new(JobKind::Detect, page_id.to_string(), 3))
        .await
        .unwrap();

    run_enrich_workers(
        queue.clone(),
        pages.clone(),
        capture_server.uri(),
        classify_server.uri(),
        600,
    )
    .await;

    let page = pages.find_by_id(page_id).await.unwrap().unwrap();
    assert_eq!(page.capture_state, EnrichmentState::Done);
    assert_eq!(page.classify_state, EnrichmentState::Done);
    assert_eq!(
        page.capture_ref.as_deref(),
        Some(format!("captures/{}.png", page_id).as_str())
    );
    assert_eq!(page.subject.as_deref(), Some("forum"));
    assert_eq!(queue.jobs_of_kind(JobKind::Index).len(), 1);
}

#[tokio::test]
async fn index_delivery_is_idempotent_per_identifier() {
    let index_server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/pages/_doc/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "updated"})))
        .mount(&index_server)
        .await;

    let queue = Arc::new(InMemoryJobQueue::new());
    let pages = Arc::new(InMemoryPageRepo::new());

    let page = test_page();
    let page_id = page.id;
    pages.save(&page).await.unwrap();

    let client = Arc::new(SearchIndexClient::new(
        index_server.uri(),
        "pages".to_string(),
        Duration::from_secs(2),
    ));

    let run_index_worker = |queue: Arc<InMemoryJobQueue>, pages: Arc<InMemoryPageRepo>| {
        let client = client.clone();
        async move {
            let worker = IndexWorker::new(
                queue,
                pages,
                client,
                IndexWorkerConfig {
                    retry_delay: Duration::from_millis(1),
                    idle_poll: Duration::from_millis(10),
                },
            );
            let handle = tokio::spawn(async move { worker.run().await });
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.abort();
        }
    };

    // 第一次投递
    queue
        .enqueue(Job::new(JobKind::Index, page_id.to_string(), 3))
        .await
        .unwrap();
    run_index_worker(queue.clone(), pages.clone()).await;
    assert_eq!(queue.len(), 0);

    // 同一标识符的重复投递：协作方按键upsert，无重复条目
    queue
        .enqueue(Job::new(JobKind::Index, page_id.to_string(), 3))
        .await
        .unwrap();
    run_index_worker(queue.clone(), pages.clone()).await;
    assert_eq!(queue.len(), 0);

    let requests = index_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    // 两次都PUT到同一文档路径
    let expected_path = format!("/pages/_doc/{}", page_id);
    for request in &requests {
        assert_eq!(request.url.path(), expected_path);
    }
}

#[tokio::test]
async fn uuid_payload_refs_are_page_scoped() {
    // 富化任务引用不存在的页面时被丢弃而不是阻塞队列
    let capture_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1]))
        .mount(&capture_server)
        .await;

    let queue = Arc::new(InMemoryJobQueue::new());
    let pages = Arc::new(InMemoryPageRepo::new());

    queue
        .enqueue(Job::new(JobKind::Enrich, Uuid::new_v4().to_string(), 3))
        .await
        .unwrap();
    queue
        .enqueue(Job::new(JobKind::Enrich, "not-a-uuid".to_string(), 3))
        .await
        .unwrap();

    run_enrich_workers(
        queue.clone(),
        pages,
        capture_server.uri(),
        capture_server.uri(),
        300,
    )
    .await;

    assert_eq!(queue.len(), 0);
}
