use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use super::{DocumentRecord, ExtractionRecord, JobStore};
use crate::db::document_repo::{self, DocumentRow};
use crate::db::extraction_repo::{self, ExtractionRow};
use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::worker::job::{Job, JobStatus, JobUpdate};

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidValue {
            column,
            value: value.to_string(),
        })
}

fn parse_opt_ts(
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| parse_ts(column, v)).transpose()
}

fn to_i64(column: &'static str, value: u64) -> Result<i64, DatabaseError> {
    i64::try_from(value).map_err(|_| DatabaseError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn from_i64<T: TryFrom<i64>>(column: &'static str, value: i64) -> Result<T, DatabaseError> {
    T::try_from(value).map_err(|_| DatabaseError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn job_to_row(job: &Job) -> Result<JobRow, DatabaseError> {
    Ok(JobRow {
        id: job.id.clone(),
        status: job.status.as_str().to_string(),
        document_name: job.document_name.clone(),
        processing_mode: job.processing_mode.clone(),
        object_path: job.object_path.clone(),
        created_at: format_ts(job.created_at),
        updated_at: format_ts(job.updated_at),
        started_at: job.started_at.map(format_ts),
        completed_at: job.completed_at.map(format_ts),
        failed_at: job.failed_at.map(format_ts),
        processing_time_ms: job
            .processing_time_ms
            .map(|v| to_i64("processing_time_ms", v))
            .transpose()?,
        fields_extracted: job.fields_extracted.map(i64::from),
        document_ref: job.document_ref.clone(),
        extraction_ref: job.extraction_ref.clone(),
        error_message: job.error_message.clone(),
    })
}

fn row_to_job(row: JobRow) -> Result<Job, DatabaseError> {
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|_| DatabaseError::InvalidValue {
            column: "status",
            value: row.status.clone(),
        })?;

    Ok(Job {
        status,
        created_at: parse_ts("created_at", &row.created_at)?,
        updated_at: parse_ts("updated_at", &row.updated_at)?,
        started_at: parse_opt_ts("started_at", row.started_at.as_deref())?,
        completed_at: parse_opt_ts("completed_at", row.completed_at.as_deref())?,
        failed_at: parse_opt_ts("failed_at", row.failed_at.as_deref())?,
        processing_time_ms: row
            .processing_time_ms
            .map(|v| from_i64("processing_time_ms", v))
            .transpose()?,
        fields_extracted: row
            .fields_extracted
            .map(|v| from_i64("fields_extracted", v))
            .transpose()?,
        id: row.id,
        document_name: row.document_name,
        processing_mode: row.processing_mode,
        object_path: row.object_path,
        document_ref: row.document_ref,
        extraction_ref: row.extraction_ref,
        error_message: row.error_message,
    })
}

fn row_to_document(row: DocumentRow) -> Result<DocumentRecord, DatabaseError> {
    Ok(DocumentRecord {
        size_bytes: from_i64("size_bytes", row.size_bytes)?,
        page_count: from_i64("page_count", row.page_count)?,
        created_at: parse_ts("created_at", &row.created_at)?,
        id: row.id,
        job_id: row.job_id,
        filename: row.filename,
        object_path: row.object_path,
        content_type: row.content_type,
    })
}

fn extraction_to_row(record: &ExtractionRecord) -> Result<ExtractionRow, DatabaseError> {
    Ok(ExtractionRow {
        id: record.id.clone(),
        job_id: record.job_id.clone(),
        document_ref: record.document_ref.clone(),
        strategy_used: record.strategy_used.as_str().to_string(),
        fields: serde_json::to_string(&record.fields).map_err(|e| DatabaseError::Json {
            column: "fields",
            source: e,
        })?,
        pages_processed: to_i64("pages_processed", record.pages_processed as u64)?,
        review_flags: serde_json::to_string(&record.review_flags).map_err(|e| {
            DatabaseError::Json {
                column: "review_flags",
                source: e,
            }
        })?,
        extraction_time_ms: to_i64("extraction_time_ms", record.extraction_time_ms)?,
        created_at: format_ts(record.created_at),
    })
}

fn row_to_extraction(row: ExtractionRow) -> Result<ExtractionRecord, DatabaseError> {
    Ok(ExtractionRecord {
        strategy_used: row
            .strategy_used
            .parse()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "strategy_used",
                value: row.strategy_used.clone(),
            })?,
        fields: serde_json::from_str(&row.fields).map_err(|e| DatabaseError::Json {
            column: "fields",
            source: e,
        })?,
        review_flags: serde_json::from_str(&row.review_flags).map_err(|e| {
            DatabaseError::Json {
                column: "review_flags",
                source: e,
            }
        })?,
        pages_processed: from_i64("pages_processed", row.pages_processed)?,
        extraction_time_ms: from_i64("extraction_time_ms", row.extraction_time_ms)?,
        created_at: parse_ts("created_at", &row.created_at)?,
        id: row.id,
        job_id: row.job_id,
        document_ref: row.document_ref,
    })
}

fn invalid_transition(id: &str, from: JobStatus, to: JobStatus) -> DatabaseError {
    DatabaseError::InvalidTransition {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

// ─── SqliteJobStore ─────────────────────────────────────────────────────────

/// Job store over the `jobs`, `documents` and `extractions` tables.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, DatabaseError> {
        job_repo::count_by_status(&self.db, status.as_str())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: &Job) -> Result<(), DatabaseError> {
        job_repo::insert(&self.db, &job_to_row(job)?)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)?.map(row_to_job).transpose()
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job, DatabaseError> {
        let mut job = self
            .get_job(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                table: "jobs",
                id: id.to_string(),
            })?;

        let from = job.status;
        if let Some(next) = update.status {
            if !from.can_transition_to(next) {
                return Err(invalid_transition(id, from, next));
            }
        }

        update.apply(&mut job, Utc::now());
        if !job_repo::update(&self.db, &job_to_row(&job)?, from.as_str())? {
            // Another writer moved the job between our read and write
            let current = self.get_job(id).await?.ok_or_else(|| DatabaseError::NotFound {
                table: "jobs",
                id: id.to_string(),
            })?;
            return Err(invalid_transition(id, current.status, job.status));
        }
        Ok(job)
    }

    async fn try_transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, DatabaseError> {
        job_repo::transition_status(
            &self.db,
            id,
            from.as_str(),
            to.as_str(),
            &format_ts(Utc::now()),
        )
    }

    async fn save_document(&self, document: &DocumentRecord) -> Result<(), DatabaseError> {
        let row = DocumentRow {
            id: document.id.clone(),
            job_id: document.job_id.clone(),
            filename: document.filename.clone(),
            object_path: document.object_path.clone(),
            content_type: document.content_type.clone(),
            size_bytes: to_i64("size_bytes", document.size_bytes)?,
            page_count: i64::from(document.page_count),
            created_at: format_ts(document.created_at),
        };
        document_repo::insert(&self.db, &row)
    }

    async fn save_extraction(&self, extraction: &ExtractionRecord) -> Result<(), DatabaseError> {
        extraction_repo::insert(&self.db, &extraction_to_row(extraction)?)
    }

    async fn find_document_by_job(
        &self,
        job_id: &str,
    ) -> Result<Option<DocumentRecord>, DatabaseError> {
        document_repo::find_by_job(&self.db, job_id)?
            .map(row_to_document)
            .transpose()
    }

    async fn find_extraction_by_job(
        &self,
        job_id: &str,
    ) -> Result<Option<ExtractionRecord>, DatabaseError> {
        extraction_repo::find_by_job(&self.db, job_id)?
            .map(row_to_extraction)
            .transpose()
    }

    async fn list_stuck_jobs(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Job>, DatabaseError> {
        job_repo::list_started_before(
            &self.db,
            JobStatus::Processing.as_str(),
            &format_ts(started_before),
        )?
        .into_iter()
        .map(row_to_job)
        .collect()
    }
}
