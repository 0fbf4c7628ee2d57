//! Polling loop around [`process_message`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use super::processor::{process_message, sweep_stale_jobs, ProcessOutcome};
use crate::context::ServiceContext;
use crate::error::IdpError;

/// Cloneable handle that stops a running [`Worker`].
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Single-consumer worker. Run several processes to scale out; the queue
/// lease and the job status guard keep them from doubling up.
pub struct Worker {
    ctx: Arc<ServiceContext>,
    shutdown: ShutdownHandle,
}

impl Worker {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Receives up to `max_messages` messages and processes them in order.
    pub async fn poll_once(&self) -> Result<Vec<ProcessOutcome>, IdpError> {
        let queue = &self.ctx.config.queue;
        let messages = self
            .ctx
            .queue
            .receive(queue.max_messages, queue.visibility_timeout())
            .await?;

        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            outcomes.push(process_message(&self.ctx, message).await?);
        }
        Ok(outcomes)
    }

    /// Sweeps stale jobs, then polls until shutdown is triggered. The sweep
    /// repeats once per processing budget so jobs abandoned by a crashed
    /// worker are settled without waiting for a restart.
    pub async fn run(&self) -> Result<(), IdpError> {
        let polling = self.ctx.config.queue.polling_interval();
        let sweep_every = self.ctx.config.processing.max_processing().max(polling);
        info!(
            queue = %self.ctx.queue.name(),
            polling_secs = polling.as_secs(),
            sweep_secs = sweep_every.as_secs(),
            "Worker started"
        );

        self.sweep().await;
        let mut last_sweep = Instant::now();

        let mut interval = tokio::time::interval(polling);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // skip immediate first tick

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            match self.poll_once().await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        log_outcome(&outcome);
                    }
                }
                Err(e) => error!(error = %e, kind = e.kind().as_str(), "Polling iteration failed"),
            }

            if last_sweep.elapsed() >= sweep_every {
                self.sweep().await;
                last_sweep = Instant::now();
            }

            if self.shutdown.is_triggered() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {},
                _ = self.shutdown.notify.notified() => {},
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    async fn sweep(&self) {
        if let Err(e) = sweep_stale_jobs(&self.ctx).await {
            error!(error = %e, "Stale job sweep failed");
        }
    }
}

fn log_outcome(outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::Completed { job_id } => info!(job_id = %job_id, "Message processed"),
        ProcessOutcome::Failed { job_id, error } => {
            info!(job_id = %job_id, error = %error, "Message dead-lettered")
        }
        ProcessOutcome::Skipped { job_id, status } => {
            info!(job_id = %job_id, status = %status, "Message skipped")
        }
        ProcessOutcome::Rejected { reason } => info!(reason = %reason, "Message rejected"),
    }
}
