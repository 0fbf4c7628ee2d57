//! Queue repository backing `SqliteQueue`.
//!
//! A message is visible when `visible_at <= now`. Claiming it issues a new
//! pop receipt and pushes `visible_at` forward by the lease; only the holder
//! of the current receipt may delete or extend it.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct QueueRow {
    pub id: String,
    pub queue: String,
    pub body: String,
    pub enqueued_at: String,
    pub visible_at: i64,
    pub pop_receipt: Option<String>,
    pub dequeue_count: i64,
}

impl QueueRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            queue: row.get("queue")?,
            body: row.get("body")?,
            enqueued_at: row.get("enqueued_at")?,
            visible_at: row.get("visible_at")?,
            pop_receipt: row.get("pop_receipt")?,
            dequeue_count: row.get("dequeue_count")?,
        })
    }
}

pub fn enqueue(
    db: &Database,
    queue: &str,
    id: &str,
    body: &str,
    enqueued_at: &str,
    visible_at: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO queue_messages (id, queue, body, enqueued_at, visible_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, queue, body, enqueued_at, visible_at],
        )?;
        Ok(())
    })
}

/// Claims up to `max` visible messages in FIFO order.
///
/// Each claim is a conditional update on `visible_at`, so two processes
/// sharing the file cannot both win the same message.
pub fn claim(
    db: &Database,
    queue: &str,
    max: usize,
    now_ms: i64,
    lease_ms: i64,
) -> Result<Vec<QueueRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM queue_messages WHERE queue = ?1 AND visible_at <= ?2
             ORDER BY seq ASC LIMIT ?3",
        )?;
        let candidates = stmt
            .query_map(params![queue, now_ms, max as i64], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let receipt = uuid::Uuid::new_v4().to_string();
            let changed = conn.execute(
                "UPDATE queue_messages SET pop_receipt = ?2, visible_at = ?3,
                 dequeue_count = dequeue_count + 1
                 WHERE id = ?1 AND visible_at <= ?4",
                params![id, receipt, now_ms + lease_ms, now_ms],
            )?;
            if changed == 0 {
                continue;
            }
            let row = conn.query_row(
                "SELECT * FROM queue_messages WHERE id = ?1",
                params![id],
                QueueRow::from_row,
            )?;
            claimed.push(row);
        }
        Ok(claimed)
    })
}

/// Deletes a message if `pop_receipt` is still the current one.
pub fn delete(db: &Database, id: &str, pop_receipt: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM queue_messages WHERE id = ?1 AND pop_receipt = ?2",
            params![id, pop_receipt],
        )?;
        Ok(changed == 1)
    })
}

/// Moves `visible_at` for a message still held under `pop_receipt`.
pub fn extend(
    db: &Database,
    id: &str,
    pop_receipt: &str,
    visible_at: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue_messages SET visible_at = ?3 WHERE id = ?1 AND pop_receipt = ?2",
            params![id, pop_receipt, visible_at],
        )?;
        Ok(changed == 1)
    })
}

/// Lists every message in a queue regardless of visibility.
pub fn list(db: &Database, queue: &str) -> Result<Vec<QueueRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM queue_messages WHERE queue = ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map(params![queue], QueueRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
