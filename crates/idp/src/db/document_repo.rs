//! Document repository: one row per uploaded document that finished extraction.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub job_id: String,
    pub filename: String,
    pub object_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub page_count: i64,
    pub created_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            filename: row.get("filename")?,
            object_path: row.get("object_path")?,
            content_type: row.get("content_type")?,
            size_bytes: row.get("size_bytes")?,
            page_count: row.get("page_count")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(db: &Database, doc: &DocumentRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, job_id, filename, object_path, content_type,
             size_bytes, page_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.id,
                doc.job_id,
                doc.filename,
                doc.object_path,
                doc.content_type,
                doc.size_bytes,
                doc.page_count,
                doc.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the most recent document written for a job.
pub fn find_by_job(db: &Database, job_id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM documents WHERE job_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![job_id],
                DocumentRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}
