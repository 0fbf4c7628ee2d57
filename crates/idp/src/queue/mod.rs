//! Message queue capability with visibility leases.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

pub mod sqlite;

pub use sqlite::SqliteQueue;

/// A message handed out by [`MessageQueue::receive`]. It stays invisible to
/// other consumers until its lease runs out or it is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub pop_receipt: String,
    pub dequeue_count: u32,
    pub body: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Appends a message and returns its id.
    async fn send(&self, body: &str) -> Result<String, QueueError>;

    async fn receive(
        &self,
        max_messages: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Fails with [`QueueError::LeaseLost`] when `pop_receipt` is stale.
    async fn delete(&self, message_id: &str, pop_receipt: &str) -> Result<(), QueueError>;

    async fn extend_visibility(
        &self,
        message_id: &str,
        pop_receipt: &str,
        visibility: Duration,
    ) -> Result<(), QueueError>;
}
