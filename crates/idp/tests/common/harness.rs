//! Isolated environment for worker and dispatcher tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use idp::config::Config;
use idp::extraction::{
    BackendError, BatchCascader, ExtractionBackend, ExtractionOrchestrator, FieldSpec,
    FieldValues, Page, PageRenderer, RenderError,
};
use idp::worker::message::QueueMessage;
use idp::{
    Database, DatabaseError, Dispatcher, FileObjectStore, Job, JobStore, MessageQueue,
    ObjectStore, QueueError, ReceivedMessage, ServiceContext, SqliteJobStore, SqliteQueue,
    Worker,
};

use super::builders::ConfigBuilder;

/// Backend returning a fixed JSON object, or failing every call.
pub struct FakeBackend {
    name: &'static str,
    response: Option<Value>,
    calls: AtomicUsize,
}

impl FakeBackend {
    pub fn returning(name: &'static str, response: Value) -> Arc<Self> {
        Arc::new(Self {
            name,
            response: Some(response),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            response: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for FakeBackend {
    async fn extract(
        &self,
        _pages: &[Page],
        _prompt: &str,
        _fields: &[FieldSpec],
    ) -> Result<FieldValues, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(value) => Ok(value.as_object().cloned().unwrap_or_default()),
            None => Err(BackendError::Unavailable(format!("{} is down", self.name))),
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Renders any document into `pages` blank pages.
pub struct FakeRenderer {
    pub pages: usize,
}

impl PageRenderer for FakeRenderer {
    fn render(&self, _bytes: &[u8], _filename: &str) -> Result<Vec<Page>, RenderError> {
        Ok((1..=self.pages)
            .map(|number| Page {
                number,
                png: vec![0x89, b'P', b'N', b'G'],
            })
            .collect())
    }
}

/// Queue whose sends always fail.
pub struct UnavailableQueue;

#[async_trait]
impl MessageQueue for UnavailableQueue {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn send(&self, _body: &str) -> Result<String, QueueError> {
        Err(QueueError::Database(DatabaseError::LockPoisoned))
    }

    async fn receive(
        &self,
        _max_messages: usize,
        _visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _message_id: &str, _pop_receipt: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn extend_visibility(
        &self,
        _message_id: &str,
        _pop_receipt: &str,
        _visibility: Duration,
    ) -> Result<(), QueueError> {
        Ok(())
    }
}

fn fake_orchestrator(
    config: &Config,
    primary: &Arc<FakeBackend>,
    secondary: &Arc<FakeBackend>,
) -> ExtractionOrchestrator {
    ExtractionOrchestrator::new(
        primary.clone(),
        secondary.clone(),
        Arc::new(FakeRenderer { pages: 3 }),
        BatchCascader::new(config.processing.batch_size),
    )
}

pub fn default_response() -> Value {
    json!({ "invoice_number": "INV-2026-001", "total": 1620.0 })
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub config: Config,
    pub objects: Arc<FileObjectStore>,
    pub queue: Arc<SqliteQueue>,
    pub dead_letters: Arc<SqliteQueue>,
    pub jobs: Arc<SqliteJobStore>,
    pub primary: Arc<FakeBackend>,
    pub secondary: Arc<FakeBackend>,
    pub ctx: Arc<ServiceContext>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_backends(
            FakeBackend::returning("primary", default_response()),
            FakeBackend::returning("secondary", default_response()),
        )
    }

    pub fn with_backends(primary: Arc<FakeBackend>, secondary: Arc<FakeBackend>) -> Self {
        Self::build(ConfigBuilder::new(), primary, secondary)
    }

    pub fn build(
        config: ConfigBuilder,
        primary: Arc<FakeBackend>,
        secondary: Arc<FakeBackend>,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.storage_root(temp_dir.path().join("objects")).build();

        let db = Database::open_in_memory().expect("Failed to open database");
        let objects = Arc::new(FileObjectStore::new(&config.storage.root));
        let queue = Arc::new(SqliteQueue::new(db.clone(), config.queue.name.clone()));
        let dead_letters = Arc::new(SqliteQueue::new(
            db.clone(),
            config.queue.dead_letter_name.clone(),
        ));
        let jobs = Arc::new(SqliteJobStore::new(db.clone()));

        let orchestrator = fake_orchestrator(&config, &primary, &secondary);

        let ctx = Arc::new(ServiceContext::new(
            config.clone(),
            objects.clone() as Arc<dyn ObjectStore>,
            queue.clone() as Arc<dyn MessageQueue>,
            dead_letters.clone() as Arc<dyn MessageQueue>,
            jobs.clone() as Arc<dyn JobStore>,
            orchestrator,
        ));

        Self {
            temp_dir,
            db,
            config,
            objects,
            queue,
            dead_letters,
            jobs,
            primary,
            secondary,
            ctx,
        }
    }

    /// Same services, but dead letters go to `dead_letters`.
    pub fn context_with_dead_letters(
        &self,
        dead_letters: Arc<dyn MessageQueue>,
    ) -> Arc<ServiceContext> {
        Arc::new(ServiceContext::new(
            self.config.clone(),
            self.objects.clone() as Arc<dyn ObjectStore>,
            self.queue.clone() as Arc<dyn MessageQueue>,
            dead_letters,
            self.jobs.clone() as Arc<dyn JobStore>,
            fake_orchestrator(&self.config, &self.primary, &self.secondary),
        ))
    }

    pub fn worker(&self) -> Worker {
        Worker::new(Arc::clone(&self.ctx))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.ctx))
    }

    pub fn storage_root(&self) -> PathBuf {
        self.config.storage.root.clone()
    }

    pub fn container(&self) -> &str {
        &self.config.storage.container
    }

    /// Uploads the object, creates the pending job and sends the message,
    /// the way the dispatcher does for large documents.
    pub async fn enqueue(&self, message: &QueueMessage) {
        self.objects
            .put(self.container(), &message.object_path, b"%PDF-1.7 test document")
            .await
            .expect("upload");
        self.create_pending_job(message).await;
        self.send(message).await;
    }

    /// Creates the pending job and sends the message without uploading.
    pub async fn enqueue_without_object(&self, message: &QueueMessage) {
        self.create_pending_job(message).await;
        self.send(message).await;
    }

    pub async fn create_pending_job(&self, message: &QueueMessage) {
        let job = Job::pending(
            message.job_id.as_str(),
            message.filename(),
            message.processing_mode.as_str(),
            Some(message.object_path.clone()),
            chrono::Utc::now(),
        );
        self.jobs.create_job(&job).await.expect("create job");
    }

    pub async fn send(&self, message: &QueueMessage) {
        let body = message.to_json().expect("encode message");
        self.queue.send(&body).await.expect("send message");
    }

    pub async fn job(&self, id: &str) -> Job {
        self.jobs
            .get_job(id)
            .await
            .expect("get job")
            .expect("job exists")
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len().expect("queue length")
    }

    pub fn dead_letter_bodies(&self) -> Vec<Value> {
        self.dead_letters
            .peek_bodies()
            .expect("dead letters")
            .iter()
            .map(|b| serde_json::from_str(b).expect("dead letter JSON"))
            .collect()
    }

    /// Object names stored under `container/job_id/`.
    pub fn objects_for(&self, container: &str, job_id: &str) -> Vec<String> {
        let dir = self.storage_root().join(container).join(job_id);
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Polls the job until it reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: &str, timeout: Duration) -> Job {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.job(id).await;
            if job.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
