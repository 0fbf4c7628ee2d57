//! Object storage capability and naming conventions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::sanitize;

pub mod filesystem;
pub mod retry;

pub use filesystem::FileObjectStore;
pub use retry::{RetryPolicy, RetryingObjectReader};

/// Put/get/delete/copy over named objects grouped into containers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, container: &str, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Returns `StorageError::NotFound` when the object does not exist (yet).
    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, container: &str, name: &str) -> Result<bool, StorageError>;

    async fn copy(
        &self,
        from_container: &str,
        name: &str,
        to_container: &str,
        to_name: &str,
    ) -> Result<(), StorageError>;

    async fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError>;
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// `{job_id}/{YYYYmmdd_HHMMSS}_{filename}` in the primary container.
pub fn upload_object_name(job_id: &str, filename: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}",
        job_id,
        timestamp(now),
        sanitize::sanitize_filename(filename)
    )
}

/// `{job_id}/processed_{YYYYmmdd_HHMMSS}_{last segment of object_name}`.
pub fn processed_object_name(job_id: &str, object_name: &str, now: DateTime<Utc>) -> String {
    let last = object_name.rsplit('/').next().unwrap_or(object_name);
    format!("{}/processed_{}_{}", job_id, timestamp(now), last)
}
