//! Shared services handed to the dispatcher and the worker.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::IdpError;
use crate::extraction::{
    BatchCascader, ChatVisionBackend, DefaultPageRenderer, ExtractionBackend, ExtractionError,
    ExtractionOrchestrator,
};
use crate::queue::{MessageQueue, SqliteQueue};
use crate::storage::{FileObjectStore, ObjectStore, RetryingObjectReader};
use crate::store::{JobStore, SqliteJobStore};

/// Built once at startup and borrowed by everything else.
pub struct ServiceContext {
    pub config: Config,
    pub objects: Arc<dyn ObjectStore>,
    pub reader: RetryingObjectReader,
    pub queue: Arc<dyn MessageQueue>,
    pub dead_letters: Arc<dyn MessageQueue>,
    pub jobs: Arc<dyn JobStore>,
    pub orchestrator: ExtractionOrchestrator,
}

impl ServiceContext {
    pub fn new(
        config: Config,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn MessageQueue>,
        dead_letters: Arc<dyn MessageQueue>,
        jobs: Arc<dyn JobStore>,
        orchestrator: ExtractionOrchestrator,
    ) -> Self {
        let reader = RetryingObjectReader::new(Arc::clone(&objects), config.retry.policy());
        Self {
            config,
            objects,
            reader,
            queue,
            dead_letters,
            jobs,
            orchestrator,
        }
    }

    /// Wires the default implementations: filesystem objects, SQLite queues
    /// and job store, HTTP chat backends and the `pdftoppm` renderer.
    pub fn from_config(config: Config, db: Database) -> Result<Self, IdpError> {
        let objects: Arc<dyn ObjectStore> = Arc::new(FileObjectStore::new(&config.storage.root));
        let queue: Arc<dyn MessageQueue> =
            Arc::new(SqliteQueue::new(db.clone(), config.queue.name.clone()));
        let dead_letters: Arc<dyn MessageQueue> = Arc::new(SqliteQueue::new(
            db.clone(),
            config.queue.dead_letter_name.clone(),
        ));
        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db));

        let primary = build_backend(&config, true)?;
        let secondary = build_backend(&config, false)?;
        let renderer = Arc::new(DefaultPageRenderer::new(
            config.processing.render_dpi,
            config.processing.max_image_dimension,
        ));
        let orchestrator = ExtractionOrchestrator::new(
            primary,
            secondary,
            renderer,
            BatchCascader::new(config.processing.batch_size),
        );

        Ok(Self::new(config, objects, queue, dead_letters, jobs, orchestrator))
    }
}

fn build_backend(config: &Config, primary: bool) -> Result<Arc<dyn ExtractionBackend>, IdpError> {
    let backend = if primary {
        &config.backends.primary
    } else {
        &config.backends.secondary
    };
    let settings = backend.settings()?;
    let client = ChatVisionBackend::new(settings).map_err(|e| ExtractionError::Backend {
        backend: backend.name.clone(),
        source: e,
    })?;
    tracing::info!(
        backend = %backend.name,
        endpoint = %crate::sanitize::redact_url(&backend.endpoint),
        model = %backend.model,
        "Extraction backend configured"
    );
    Ok(Arc::new(client))
}
