use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::ObjectStore;
use crate::error::StorageError;

/// Delay-and-retry policy for reading objects that were just written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_retries: 3,
            backoff_factor: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (0-based): `initial * factor^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(self.initial_delay.as_secs_f64() * factor)
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|a| self.delay_for(a)).collect()
    }
}

/// Wraps an [`ObjectStore`] read with bounded exponential backoff.
///
/// Every read pays the initial delay up front; the object is expected to
/// have just been uploaded and may not be visible yet.
pub struct RetryingObjectReader {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl RetryingObjectReader {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn read(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let mut waited = self.policy.initial_delay;
        tokio::time::sleep(self.policy.initial_delay).await;

        let mut attempt = 0u32;
        loop {
            match self.store.get(container, name).await {
                Ok(bytes) => {
                    debug!(container, name, attempt, "Object read");
                    return Ok(bytes);
                }
                Err(e @ StorageError::InvalidName(_)) => return Err(e),
                Err(e) if attempt >= self.policy.max_retries => {
                    return Err(StorageError::Unavailable {
                        name: format!("{}/{}", container, name),
                        attempts: attempt + 1,
                        waited_secs: waited.as_secs_f64(),
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        container,
                        name,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Object not readable yet, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails with NotFound until `visible_after` gets have happened.
    struct FlakyStore {
        visible_after: u32,
        calls: AtomicU32,
        call_times: Mutex<Vec<Instant>>,
    }

    impl FlakyStore {
        fn new(visible_after: u32) -> Self {
            Self {
                visible_after,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(&self, _: &str, _: &str, _: &[u8]) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
            self.call_times.lock().unwrap().push(Instant::now());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.visible_after {
                Ok(b"ready".to_vec())
            } else {
                Err(StorageError::NotFound {
                    container: container.to_string(),
                    name: name.to_string(),
                })
            }
        }

        async fn delete(&self, _: &str, _: &str) -> Result<bool, StorageError> {
            Ok(false)
        }

        async fn copy(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn exists(&self, _: &str, _: &str) -> Result<bool, StorageError> {
            Ok(false)
        }
    }

    #[test]
    fn test_backoff_schedule_defaults() {
        let schedule: Vec<f64> = RetryPolicy::default()
            .backoff_schedule()
            .iter()
            .map(Duration::as_secs_f64)
            .collect();
        assert_eq!(schedule, vec![5.0, 7.5, 11.25]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_succeeds_after_initial_delay() {
        let store = Arc::new(FlakyStore::new(0));
        let reader = RetryingObjectReader::new(store.clone(), RetryPolicy::default());

        let start = Instant::now();
        let bytes = reader.read("documents", "a.pdf").await.unwrap();
        assert_eq!(bytes, b"ready");
        assert_eq!(store.call_times.lock().unwrap()[0] - start, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_recovers_on_second_retry() {
        let store = Arc::new(FlakyStore::new(2));
        let reader = RetryingObjectReader::new(store.clone(), RetryPolicy::default());

        reader.read("documents", "a.pdf").await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_waits_backoff_sequence_then_fails() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let reader = RetryingObjectReader::new(store.clone(), RetryPolicy::default());

        let err = reader.read("documents", "a.pdf").await.unwrap_err();

        let times = store.call_times.lock().unwrap().clone();
        assert_eq!(times.len(), 4);
        let gaps: Vec<f64> = times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs_f64())
            .collect();
        assert_eq!(gaps, vec![5.0, 7.5, 11.25]);

        match err {
            StorageError::Unavailable {
                attempts,
                waited_secs,
                source,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert!(waited_secs >= 23.75);
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_name_is_not_retried() {
        struct Rejecting;

        #[async_trait]
        impl ObjectStore for Rejecting {
            async fn put(&self, _: &str, _: &str, _: &[u8]) -> Result<(), StorageError> {
                Ok(())
            }
            async fn get(&self, _: &str, name: &str) -> Result<Vec<u8>, StorageError> {
                Err(StorageError::InvalidName(name.to_string()))
            }
            async fn delete(&self, _: &str, _: &str) -> Result<bool, StorageError> {
                Ok(false)
            }
            async fn copy(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), StorageError> {
                Ok(())
            }
            async fn exists(&self, _: &str, _: &str) -> Result<bool, StorageError> {
                Ok(false)
            }
        }

        let reader = RetryingObjectReader::new(Arc::new(Rejecting), RetryPolicy::default());
        let err = reader.read("documents", "../x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }
}
