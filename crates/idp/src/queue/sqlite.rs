use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{MessageQueue, ReceivedMessage};
use crate::db::{queue_repo, Database};
use crate::error::QueueError;

/// Queue backed by the `queue_messages` table. Several queues share the
/// table, distinguished by name.
#[derive(Clone)]
pub struct SqliteQueue {
    db: Database,
    name: String,
}

impl SqliteQueue {
    pub fn new(db: Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    /// Message bodies currently stored, visible or not, oldest first.
    pub fn peek_bodies(&self) -> Result<Vec<String>, QueueError> {
        Ok(queue_repo::list(&self.db, &self.name)?
            .into_iter()
            .map(|row| row.body)
            .collect())
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(queue_repo::list(&self.db, &self.name)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl MessageQueue for SqliteQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        queue_repo::enqueue(
            &self.db,
            &self.name,
            &id,
            body,
            &now.to_rfc3339(),
            now.timestamp_millis(),
        )?;
        tracing::debug!(queue = %self.name, message_id = %id, "Message enqueued");
        Ok(id)
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let rows = queue_repo::claim(
            &self.db,
            &self.name,
            max_messages.max(1),
            now_ms(),
            millis(visibility),
        )?;

        rows.into_iter()
            .map(|row| {
                let pop_receipt = row.pop_receipt.ok_or_else(|| {
                    QueueError::Malformed(format!("claimed message '{}' has no receipt", row.id))
                })?;
                Ok(ReceivedMessage {
                    message_id: row.id,
                    pop_receipt,
                    dequeue_count: u32::try_from(row.dequeue_count).unwrap_or(u32::MAX),
                    body: row.body,
                })
            })
            .collect()
    }

    async fn delete(&self, message_id: &str, pop_receipt: &str) -> Result<(), QueueError> {
        if queue_repo::delete(&self.db, message_id, pop_receipt)? {
            Ok(())
        } else {
            Err(QueueError::LeaseLost {
                message_id: message_id.to_string(),
            })
        }
    }

    async fn extend_visibility(
        &self,
        message_id: &str,
        pop_receipt: &str,
        visibility: Duration,
    ) -> Result<(), QueueError> {
        let visible_at = now_ms() + millis(visibility);
        if queue_repo::extend(&self.db, message_id, pop_receipt, visible_at)? {
            Ok(())
        } else {
            Err(QueueError::LeaseLost {
                message_id: message_id.to_string(),
            })
        }
    }
}
