//! Extraction repository.
//!
//! `fields` and `review_flags` are stored as JSON text columns.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct ExtractionRow {
    pub id: String,
    pub job_id: String,
    pub document_ref: String,
    pub strategy_used: String,
    pub fields: String,
    pub pages_processed: i64,
    pub review_flags: String,
    pub extraction_time_ms: i64,
    pub created_at: String,
}

impl ExtractionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            document_ref: row.get("document_ref")?,
            strategy_used: row.get("strategy_used")?,
            fields: row.get("fields")?,
            pages_processed: row.get("pages_processed")?,
            review_flags: row.get("review_flags")?,
            extraction_time_ms: row.get("extraction_time_ms")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(db: &Database, row: &ExtractionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extractions (id, job_id, document_ref, strategy_used, fields,
             pages_processed, review_flags, extraction_time_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id,
                row.job_id,
                row.document_ref,
                row.strategy_used,
                row.fields,
                row.pages_processed,
                row.review_flags,
                row.extraction_time_ms,
                row.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the current extraction of a job (the most recently written one).
pub fn find_by_job(db: &Database, job_id: &str) -> Result<Option<ExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM extractions WHERE job_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![job_id],
                ExtractionRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}
