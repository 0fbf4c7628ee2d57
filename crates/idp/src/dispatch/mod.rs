//! Entry point for new documents: validates, then either extracts inline or
//! hands the document to the background worker.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use crate::context::ServiceContext;
use crate::error::{IdpError, QueueError};
use crate::extraction::{ExtractionResult, FieldSpec, ProcessingMode};
use crate::sanitize::redact_object_name;
use crate::storage::upload_object_name;
use crate::worker::{Job, JobUpdate, QueueMessage};

pub mod security;
pub mod validation;

pub use security::{check_source_url, check_upload, size_mb};
pub use validation::{validate_fields, validate_format, validate_prompt};

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub fields: Vec<FieldSpec>,
    pub prompt: String,
    pub mode: String,
    pub persistence: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(ExtractionResult),
    Queued { job_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Sync,
    Async,
}

/// Documents at or below the threshold are processed inline.
pub fn route_for(size_mb: f64, threshold_mb: f64) -> Route {
    if size_mb <= threshold_mb {
        Route::Sync
    } else {
        Route::Async
    }
}

pub struct Dispatcher {
    ctx: Arc<ServiceContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, IdpError> {
        validate_fields(&request.fields)?;
        validate_prompt(&request.prompt)?;
        validate_format(&request.filename)?;
        check_upload(&request.filename, &request.bytes, &self.ctx.config.security)?;
        let mode: ProcessingMode = request.mode.parse()?;

        let size = size_mb(request.bytes.len());
        let route = route_for(size, self.ctx.config.processing.sync_threshold_mb);
        let span = info_span!("submit", mode = %mode, size_mb = size, route = ?route);

        async move {
            match route {
                Route::Sync => {
                    let result = self
                        .ctx
                        .orchestrator
                        .process_mode(
                            &request.bytes,
                            &request.filename,
                            &request.fields,
                            &request.prompt,
                            mode,
                        )
                        .await?;
                    Ok(SubmitOutcome::Completed(result))
                }
                Route::Async => {
                    let job_id = self.enqueue(&request, mode, size).await?;
                    Ok(SubmitOutcome::Queued { job_id })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn enqueue(
        &self,
        request: &SubmitRequest,
        mode: ProcessingMode,
        size: f64,
    ) -> Result<String, IdpError> {
        let now = Utc::now();
        let job_id = uuid::Uuid::new_v4().to_string();
        let object_path = upload_object_name(&job_id, &request.filename, now);

        self.ctx
            .objects
            .put(&self.ctx.config.storage.container, &object_path, &request.bytes)
            .await?;

        let job = Job::pending(
            job_id.as_str(),
            request.filename.as_str(),
            mode.as_str(),
            Some(object_path.clone()),
            now,
        );
        self.ctx.jobs.create_job(&job).await?;

        let message = QueueMessage {
            job_id: job_id.clone(),
            object_path: object_path.clone(),
            processing_mode: mode.as_str().to_string(),
            prompt: request.prompt.clone(),
            fields: request.fields.clone(),
            persistence: request.persistence,
            file_size_mb: size,
            created_at: now,
        };

        let sent = match message.to_json() {
            Ok(body) => self.ctx.queue.send(&body).await.map(|_| ()),
            Err(e) => Err(QueueError::from(e)),
        };
        if let Err(e) = sent {
            warn!(job_id = %job_id, error = %e, "Enqueue failed, marking job failed");
            self.ctx
                .jobs
                .update_job(
                    &job_id,
                    JobUpdate::failed(Utc::now(), format!("Enqueue failed: {}", e)),
                )
                .await?;
            return Err(e.into());
        }

        info!(
            job_id = %job_id,
            object = redact_object_name(&object_path),
            "Document queued for background processing"
        );
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_threshold() {
        assert_eq!(route_for(9.9, 10.0), Route::Sync);
        assert_eq!(route_for(10.0, 10.0), Route::Sync);
        assert_eq!(route_for(10.1, 10.0), Route::Async);
    }
}
