pub mod memory;

use async_trait::async_trait;
use onioncrawl::engines::traits::{FetchEngine, FetchError, FetchRequest, FetchResponse};
use onioncrawl::utils::retry_policy::RetryPolicy;
use onioncrawl::workers::fetch_worker::FetchWorkerConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Deterministic fetch engine stub for integration tests.
pub struct StubEngine {
    pub behavior: StubBehavior,
    pub calls: AtomicU32,
}

pub enum StubBehavior {
    /// Serve this HTML body with a 200 response.
    Html(String),
    /// Fail every request at the transport layer.
    TransportError,
}

impl StubEngine {
    pub fn html(body: &str) -> Self {
        Self {
            behavior: StubBehavior::Html(body.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: StubBehavior::TransportError,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl FetchEngine for StubEngine {
    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Html(body) => Ok(FetchResponse {
                status_code: 200,
                body: body.clone().into_bytes(),
                content_type: Some("text/html; charset=utf-8".to_string()),
                response_time_ms: 1,
            }),
            StubBehavior::TransportError => {
                Err(FetchError::Transport("connection refused".to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Fetch worker config tuned for fast test turnaround.
pub fn test_fetch_config(max_depth: i32, max_fetch_attempts: i32) -> FetchWorkerConfig {
    FetchWorkerConfig {
        max_depth,
        max_fetch_attempts,
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(1),
        enrich_max_attempts: 2,
        index_max_attempts: 3,
        proxy_backoff: RetryPolicy::linear(max_fetch_attempts as u32, Duration::from_millis(1)),
        content_backoff: RetryPolicy::linear(max_fetch_attempts as u32, Duration::from_millis(1)),
        idle_poll: Duration::from_millis(10),
        proxy_defer: Duration::from_millis(10),
    }
}
