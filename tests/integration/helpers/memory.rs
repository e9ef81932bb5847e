use async_trait::async_trait;
use chrono::Utc;
use onioncrawl::domain::models::job::{Job, JobKind, JobStatus};
use onioncrawl::domain::models::page::{EnrichmentKind, EnrichmentState, Page};
use onioncrawl::domain::models::target::{RegisterOutcome, Target, TargetState};
use onioncrawl::domain::repositories::frontier_repository::{FrontierRepository, RepositoryError};
use onioncrawl::domain::repositories::page_repository::{EnrichmentResult, PageRepository};
use onioncrawl::queue::job_queue::{JobQueue, QueueError};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory frontier store sharing the production atomicity contract:
/// exactly one concurrent register observes New per identifier.
#[derive(Default)]
pub struct InMemoryFrontier {
    targets: Mutex<HashMap<String, Target>>,
}

impl InMemoryFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, url: &str) -> Option<Target> {
        self.targets.lock().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl FrontierRepository for InMemoryFrontier {
    async fn register(&self, target: &Target) -> Result<RegisterOutcome, RepositoryError> {
        let mut targets = self.targets.lock().unwrap();
        if targets.contains_key(&target.url) {
            Ok(RegisterOutcome::Duplicate)
        } else {
            targets.insert(target.url.clone(), target.clone());
            Ok(RegisterOutcome::New)
        }
    }

    async fn mark(
        &self,
        url: &str,
        state: TargetState,
        attempt_count: i32,
    ) -> Result<(), RepositoryError> {
        let mut targets = self.targets.lock().unwrap();
        let target = targets.get_mut(url).ok_or(RepositoryError::NotFound)?;

        if target.state != state {
            if !Target::can_transition(target.state, state) {
                return Err(RepositoryError::InvalidTransition(format!(
                    "{} -> {}",
                    target.state, state
                )));
            }
            target.state = state;
        }
        target.attempt_count = attempt_count;
        target.updated_at = Utc::now().into();
        Ok(())
    }

    async fn query(&self, url: &str) -> Result<Option<Target>, RepositoryError> {
        Ok(self.targets.lock().unwrap().get(url).cloned())
    }
}

/// In-memory job queue with the production queue semantics:
/// idempotency-key merge, lease on dequeue, attempt refund on defer.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs_of_kind(&self, kind: JobKind) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<bool, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs
            .iter()
            .any(|j| j.kind == job.kind && j.payload_ref == job.payload_ref)
        {
            return Ok(false);
        }
        jobs.push(job);
        Ok(true)
    }

    async fn dequeue(&self, kind: JobKind, worker_id: Uuid) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
        let job = jobs.iter_mut().find(|j| {
            j.kind == kind
                && j.status == JobStatus::Pending
                && j.scheduled_at.map(|t| t <= now).unwrap_or(true)
        });

        if let Some(job) = job {
            job.status = JobStatus::Leased;
            job.attempt_count += 1;
            job.lock_token = Some(worker_id);
            job.lock_expires_at = Some(now + chrono::Duration::minutes(5));
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().retain(|j| j.id != job.id);
        Ok(())
    }

    async fn nack(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(j) = jobs.iter_mut().find(|j| j.id == job.id) {
            j.status = JobStatus::Pending;
            j.lock_token = None;
            j.lock_expires_at = None;
            j.scheduled_at = Some((Utc::now() + requeue_delay).into());
        }
        Ok(())
    }

    async fn defer(&self, job: &Job, requeue_delay: chrono::Duration) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(j) = jobs.iter_mut().find(|j| j.id == job.id) {
            j.status = JobStatus::Pending;
            j.lock_token = None;
            j.lock_expires_at = None;
            j.scheduled_at = Some((Utc::now() + requeue_delay).into());
            j.attempt_count -= 1;
        }
        Ok(())
    }
}

/// In-memory page repository with the version-guarded write contract.
#[derive(Default)]
pub struct InMemoryPageRepo {
    pages: Mutex<HashMap<Uuid, Page>>,
}

impl InMemoryPageRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Page> {
        self.pages.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl PageRepository for InMemoryPageRepo {
    async fn save(&self, page: &Page) -> Result<(), RepositoryError> {
        self.pages.lock().unwrap().insert(page.id, page.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Page>, RepositoryError> {
        Ok(self.pages.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_target_url(&self, url: &str) -> Result<Option<Page>, RepositoryError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .values()
            .find(|p| p.target_url == url)
            .cloned())
    }

    async fn attach_enrichment(
        &self,
        id: Uuid,
        kind: EnrichmentKind,
        state: EnrichmentState,
        result: Option<EnrichmentResult>,
        expected_version: i32,
    ) -> Result<(), RepositoryError> {
        let mut pages = self.pages.lock().unwrap();
        let page = pages.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        if page.version != expected_version {
            return Err(RepositoryError::Conflict);
        }

        match kind {
            EnrichmentKind::Capture => page.capture_state = state,
            EnrichmentKind::Classify => page.classify_state = state,
        }
        match result {
            Some(EnrichmentResult::Capture { capture_ref }) => {
                page.capture_ref = Some(capture_ref);
            }
            Some(EnrichmentResult::Classify {
                language,
                subject,
                confidence,
            }) => {
                page.language = language;
                page.subject = Some(subject);
                page.subject_confidence = Some(confidence);
            }
            None => {}
        }
        page.version += 1;
        page.updated_at = Utc::now().into();
        Ok(())
    }
}
