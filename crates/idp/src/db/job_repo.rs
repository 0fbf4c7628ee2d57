//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub document_name: String,
    pub processing_mode: String,
    pub object_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub failed_at: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub fields_extracted: Option<i64>,
    pub document_ref: Option<String>,
    pub extraction_ref: Option<String>,
    pub error_message: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            document_name: row.get("document_name")?,
            processing_mode: row.get("processing_mode")?,
            object_path: row.get("object_path")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            failed_at: row.get("failed_at")?,
            processing_time_ms: row.get("processing_time_ms")?,
            fields_extracted: row.get("fields_extracted")?,
            document_ref: row.get("document_ref")?,
            extraction_ref: row.get("extraction_ref")?,
            error_message: row.get("error_message")?,
        })
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, status, document_name, processing_mode, object_path,
             created_at, updated_at, started_at, completed_at, failed_at, processing_time_ms,
             fields_extracted, document_ref, extraction_ref, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.id,
                job.status,
                job.document_name,
                job.processing_mode,
                job.object_path,
                job.created_at,
                job.updated_at,
                job.started_at,
                job.completed_at,
                job.failed_at,
                job.processing_time_ms,
                job.fields_extracted,
                job.document_ref,
                job.extraction_ref,
                job.error_message,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites every mutable column of a job, but only while its stored
/// status is still `expected_status`.
///
/// Returns `false` when no row matched: the job is missing or another
/// writer changed its status first.
pub fn update(
    db: &Database,
    job: &JobRow,
    expected_status: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status=?2, document_name=?3, processing_mode=?4, object_path=?5,
             updated_at=?6, started_at=?7, completed_at=?8, failed_at=?9,
             processing_time_ms=?10, fields_extracted=?11, document_ref=?12,
             extraction_ref=?13, error_message=?14
             WHERE id=?1 AND status=?15",
            params![
                job.id,
                job.status,
                job.document_name,
                job.processing_mode,
                job.object_path,
                job.updated_at,
                job.started_at,
                job.completed_at,
                job.failed_at,
                job.processing_time_ms,
                job.fields_extracted,
                job.document_ref,
                job.extraction_ref,
                job.error_message,
                expected_status,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Moves a job from `from` to `to` only if it is currently in `from`.
///
/// Entering `processing` also stamps `started_at`. Returns `true` when
/// this call performed the transition.
pub fn transition_status(
    db: &Database,
    id: &str,
    from: &str,
    to: &str,
    at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?3, updated_at = ?4,
             started_at = CASE WHEN ?3 = 'processing' THEN ?4 ELSE started_at END
             WHERE id = ?1 AND status = ?2",
            params![id, from, to, at],
        )?;
        Ok(changed == 1)
    })
}

/// Lists jobs in `status` whose `started_at` is earlier than `started_before`.
///
/// Timestamps are RFC 3339 UTC strings, so lexical order matches time order.
pub fn list_started_before(
    db: &Database,
    status: &str,
    started_before: &str,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE status = ?1 AND started_at IS NOT NULL
             AND started_at < ?2 ORDER BY started_at ASC",
        )?;
        let rows = stmt
            .query_map(params![status, started_before], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
