//! Job store: the only path through which job, document and extraction
//! records are read or written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;
use crate::extraction::{ExtractionField, ExtractionResult, ProcessingMode};
use crate::worker::job::{Job, JobStatus, JobUpdate};

pub mod sqlite;

pub use sqlite::SqliteJobStore;

/// The stored copy of a processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub job_id: String,
    pub filename: String,
    pub object_path: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub page_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: String,
    pub job_id: String,
    pub document_ref: String,
    pub strategy_used: ProcessingMode,
    pub fields: Vec<ExtractionField>,
    pub pages_processed: usize,
    pub review_flags: Vec<String>,
    pub extraction_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ExtractionRecord {
    pub fn from_result(
        job_id: &str,
        document_ref: &str,
        result: &ExtractionResult,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            document_ref: document_ref.to_string(),
            strategy_used: result.strategy,
            fields: result.fields.clone(),
            pages_processed: result.pages_processed,
            review_flags: result.review_flags.clone(),
            extraction_time_ms: result.extraction_time_ms,
            created_at: now,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> Result<(), DatabaseError>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError>;

    /// Read-modify-write. Fails with `DatabaseError::NotFound` when the job
    /// does not exist and with `DatabaseError::InvalidTransition` when the
    /// status change is not allowed from the stored status, including when
    /// another writer changed it between the read and the write.
    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job, DatabaseError>;

    /// Compare-and-swap on status. Returns `false` if the job was not in
    /// `from` (someone else moved it first).
    async fn try_transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, DatabaseError>;

    async fn save_document(&self, document: &DocumentRecord) -> Result<(), DatabaseError>;

    async fn save_extraction(&self, extraction: &ExtractionRecord) -> Result<(), DatabaseError>;

    async fn find_document_by_job(
        &self,
        job_id: &str,
    ) -> Result<Option<DocumentRecord>, DatabaseError>;

    async fn find_extraction_by_job(
        &self,
        job_id: &str,
    ) -> Result<Option<ExtractionRecord>, DatabaseError>;

    /// Jobs still `processing` that started before `started_before`.
    async fn list_stuck_jobs(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Job>, DatabaseError>;
}
