//! Drives one queue message through the job lifecycle.

use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::job::{JobStatus, JobUpdate};
use super::message::{dead_letter_body, QueueMessage};
use crate::context::ServiceContext;
use crate::error::{IdpError, QueueError};
use crate::extraction::ProcessingMode;
use crate::queue::ReceivedMessage;
use crate::sanitize::redact_object_name;
use crate::storage::processed_object_name;
use crate::store::{DocumentRecord, ExtractionRecord};

/// Reason recorded when reconciliation finds a job stuck without results.
pub const INCOMPLETE_REASON: &str =
    "Processing incomplete: worker stopped before results were saved";

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Completed { job_id: String },
    Failed { job_id: String, error: String },
    /// Redelivery of a job that is no longer pending.
    Skipped { job_id: String, status: JobStatus },
    /// Body could not be parsed or names no known job.
    Rejected { reason: String },
}

/// Handles one received message: guard, process, dead-letter on failure,
/// reconcile, ack, clean up.
///
/// The message is acknowledged in every branch. Errors returned from here
/// are infrastructure failures (queue or job store unreachable).
pub async fn process_message(
    ctx: &ServiceContext,
    received: &ReceivedMessage,
) -> Result<ProcessOutcome, IdpError> {
    let span = info_span!(
        "process_message",
        message_id = %received.message_id,
        dequeue_count = received.dequeue_count,
        job_id = tracing::field::Empty
    );

    async move {
        let message = match QueueMessage::parse(&received.body) {
            Ok(message) => message,
            Err(e) => {
                let reason = format!("Malformed queue message: {}", e);
                warn!("{}", reason);
                dead_letter(ctx, &received.body, &reason).await?;
                ack(ctx, received).await?;
                return Ok(ProcessOutcome::Rejected { reason });
            }
        };
        let job_id = message.job_id.clone();
        tracing::Span::current().record("job_id", job_id.as_str());

        let Some(job) = ctx.jobs.get_job(&job_id).await? else {
            let reason = format!("No job record for '{}'", job_id);
            warn!("{}", reason);
            dead_letter(ctx, &received.body, &reason).await?;
            ack(ctx, received).await?;
            return Ok(ProcessOutcome::Rejected { reason });
        };

        if job.status != JobStatus::Pending {
            let stale = job.status == JobStatus::Processing && is_stale(ctx, job.started_at);
            let job = if stale {
                warn!(
                    job_id = %job_id,
                    "Redelivered job exceeded its processing budget, reconciling"
                );
                reconcile_job(ctx, &job_id).await?;
                ctx.jobs.get_job(&job_id).await?.unwrap_or(job)
            } else {
                job
            };

            // A failed job whose message comes back was never dead-lettered
            // or never acked; publish it again so it stays replayable.
            if job.status == JobStatus::Failed {
                let reason = job.error_message.as_deref().unwrap_or("Job failed");
                info!(job_id = %job_id, "Redelivered message for a failed job, dead-lettering");
                dead_letter(ctx, &received.body, reason).await?;
            } else {
                info!(
                    job_id = %job_id,
                    status = %job.status,
                    "Job already handled, dropping redelivery"
                );
            }
            ack(ctx, received).await?;
            return Ok(ProcessOutcome::Skipped {
                job_id,
                status: job.status,
            });
        }

        if !ctx
            .jobs
            .try_transition(&job_id, JobStatus::Pending, JobStatus::Processing)
            .await?
        {
            let status = ctx
                .jobs
                .get_job(&job_id)
                .await?
                .map(|j| j.status)
                .unwrap_or(JobStatus::Processing);
            info!(job_id = %job_id, status = %status, "Another worker claimed the job first");
            ack(ctx, received).await?;
            return Ok(ProcessOutcome::Skipped { job_id, status });
        }

        if let Err(e) = ctx
            .queue
            .extend_visibility(
                &received.message_id,
                &received.pop_receipt,
                ctx.config.processing.max_processing(),
            )
            .await
        {
            warn!(job_id = %job_id, error = %e, "Could not extend message lease");
        }

        let mut dead_letter_error = None;
        let outcome = match run_job(ctx, &message).await {
            Ok(()) => ProcessOutcome::Completed {
                job_id: job_id.clone(),
            },
            Err(e) => {
                let error_message = e.to_string();
                error!(
                    job_id = %job_id,
                    kind = e.kind().as_str(),
                    error = %error_message,
                    "Job failed"
                );
                if let Err(update_err) = ctx
                    .jobs
                    .update_job(&job_id, JobUpdate::failed(Utc::now(), error_message.as_str()))
                    .await
                {
                    error!(job_id = %job_id, error = %update_err, "Could not record job failure");
                }
                if let Err(dl_err) = dead_letter(ctx, &received.body, &error_message).await {
                    error!(
                        job_id = %job_id,
                        error = %dl_err,
                        "Could not dead-letter message, leaving it for redelivery"
                    );
                    dead_letter_error = Some(dl_err);
                }
                ProcessOutcome::Failed {
                    job_id: job_id.clone(),
                    error: error_message,
                }
            }
        };

        let final_status = match reconcile_job(ctx, &job_id).await {
            Ok(status) => status,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Reconciliation failed");
                None
            }
        };

        // Unacked, the message returns once its lease expires and the
        // failed-job branch above publishes it again.
        if let Some(e) = dead_letter_error {
            return Err(e);
        }

        ack(ctx, received).await?;

        if final_status == Some(JobStatus::Completed) {
            cleanup(ctx, &message).await;
        }

        Ok(match (outcome, final_status) {
            (ProcessOutcome::Completed { job_id }, Some(JobStatus::Failed)) => {
                ProcessOutcome::Failed {
                    job_id,
                    error: INCOMPLETE_REASON.to_string(),
                }
            }
            (outcome, _) => outcome,
        })
    }
    .instrument(span)
    .await
}

/// Steps that run while the job is `processing`. Any error fails the job.
async fn run_job(ctx: &ServiceContext, message: &QueueMessage) -> Result<(), IdpError> {
    let started = Instant::now();
    let mode: ProcessingMode = message.processing_mode.parse()?;
    let filename = message.filename();

    let bytes = ctx
        .reader
        .read(&ctx.config.storage.container, &message.object_path)
        .await?;
    debug!(
        object = redact_object_name(&message.object_path),
        size_bytes = bytes.len(),
        "Document downloaded"
    );

    let result = ctx
        .orchestrator
        .process_mode(&bytes, filename, &message.fields, &message.prompt, mode)
        .await?;

    let now = Utc::now();
    let document = DocumentRecord {
        id: uuid::Uuid::new_v4().to_string(),
        job_id: message.job_id.clone(),
        filename: filename.to_string(),
        object_path: message.object_path.clone(),
        content_type: mime_guess::from_path(filename)
            .first()
            .map(|m| m.essence_str().to_string()),
        size_bytes: bytes.len() as u64,
        page_count: u32::try_from(result.pages_processed).unwrap_or(u32::MAX),
        created_at: now,
    };
    ctx.jobs.save_document(&document).await?;

    let extraction = ExtractionRecord::from_result(&message.job_id, &document.id, &result, now);
    ctx.jobs.save_extraction(&extraction).await?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let fields_extracted = u32::try_from(result.fields_extracted()).unwrap_or(u32::MAX);
    ctx.jobs
        .update_job(
            &message.job_id,
            JobUpdate::completed(
                Utc::now(),
                elapsed_ms,
                fields_extracted,
                &document.id,
                &extraction.id,
            ),
        )
        .await?;

    info!(
        job_id = %message.job_id,
        mode = %mode,
        pages = result.pages_processed,
        fields_extracted,
        review_flags = result.review_flags.len(),
        elapsed_ms,
        "Job completed"
    );
    Ok(())
}

/// Settles a job left in `processing`: completed when its extraction record
/// exists, failed otherwise. Returns the job's status afterwards, or `None`
/// when the job does not exist.
pub async fn reconcile_job(
    ctx: &ServiceContext,
    job_id: &str,
) -> Result<Option<JobStatus>, IdpError> {
    let Some(job) = ctx.jobs.get_job(job_id).await? else {
        return Ok(None);
    };
    if job.status != JobStatus::Processing {
        return Ok(Some(job.status));
    }

    let document = ctx.jobs.find_document_by_job(job_id).await?;
    let extraction = ctx.jobs.find_extraction_by_job(job_id).await?;

    let update = match (document, extraction) {
        (Some(_), Some(extraction)) => {
            info!(job_id, "Reconciled job with saved results as completed");
            JobUpdate::reconciled(Utc::now(), extraction.document_ref, extraction.id)
        }
        _ => {
            warn!(job_id, "Reconciled job without saved results as failed");
            JobUpdate::failed(Utc::now(), INCOMPLETE_REASON)
        }
    };

    let job = ctx.jobs.update_job(job_id, update).await?;
    Ok(Some(job.status))
}

/// Reconciles every job stuck in `processing` for longer than the
/// processing budget. Returns how many were settled.
pub async fn sweep_stale_jobs(ctx: &ServiceContext) -> Result<usize, IdpError> {
    let cutoff = Utc::now() - processing_budget(ctx);
    let stuck = ctx.jobs.list_stuck_jobs(cutoff).await?;

    let mut settled = 0;
    for job in &stuck {
        match reconcile_job(ctx, &job.id).await {
            Ok(Some(status)) if status.is_terminal() => settled += 1,
            Ok(_) => {}
            Err(e) => error!(job_id = %job.id, error = %e, "Could not reconcile stale job"),
        }
    }
    if settled > 0 {
        info!(settled, "Stale jobs reconciled");
    }
    Ok(settled)
}

fn processing_budget(ctx: &ServiceContext) -> ChronoDuration {
    ChronoDuration::seconds(
        i64::try_from(ctx.config.processing.max_processing_secs).unwrap_or(i64::MAX / 1000),
    )
}

/// A job that never recorded a start is treated as stale.
fn is_stale(ctx: &ServiceContext, started_at: Option<DateTime<Utc>>) -> bool {
    started_at.is_none_or(|started| started < Utc::now() - processing_budget(ctx))
}

/// Applies the retention policy to the uploaded object. Failures are
/// logged and never change the job.
async fn cleanup(ctx: &ServiceContext, message: &QueueMessage) {
    let storage = &ctx.config.storage;
    let object = redact_object_name(&message.object_path);

    if !message.persistence {
        match ctx.objects.delete(&storage.container, &message.object_path).await {
            Ok(true) => debug!(job_id = %message.job_id, object, "Uploaded object deleted"),
            Ok(false) => debug!(job_id = %message.job_id, object, "Uploaded object already gone"),
            Err(e) => warn!(
                job_id = %message.job_id,
                object,
                error = %e,
                "Could not delete uploaded object"
            ),
        }
        return;
    }

    if storage.copy_to_processed {
        let target = processed_object_name(&message.job_id, &message.object_path, Utc::now());
        if let Err(e) = ctx
            .objects
            .copy(
                &storage.container,
                &message.object_path,
                &storage.processed_container,
                &target,
            )
            .await
        {
            warn!(
                job_id = %message.job_id,
                object,
                error = %e,
                "Could not copy object to processed area"
            );
        }
    }
}

async fn dead_letter(
    ctx: &ServiceContext,
    raw_body: &str,
    error_message: &str,
) -> Result<(), IdpError> {
    let payload = dead_letter_body(raw_body, error_message, ctx.queue.name(), Utc::now());
    let body = serde_json::to_string(&payload).map_err(QueueError::from)?;
    ctx.dead_letters.send(&body).await?;
    Ok(())
}

async fn ack(ctx: &ServiceContext, received: &ReceivedMessage) -> Result<(), IdpError> {
    match ctx
        .queue
        .delete(&received.message_id, &received.pop_receipt)
        .await
    {
        Ok(()) => Ok(()),
        Err(QueueError::LeaseLost { message_id }) => {
            warn!(message_id = %message_id, "Lease expired before ack; message may be redelivered");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
