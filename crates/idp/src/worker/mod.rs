//! Background worker: consumes the processing queue and drives jobs from
//! `pending` to `completed` or `failed`.

pub mod job;
pub mod message;
pub mod processor;
pub mod runner;

pub use job::{Job, JobStatus, JobUpdate};
pub use message::{dead_letter_body, parse_persistence, QueueMessage};
pub use processor::{process_message, reconcile_job, sweep_stale_jobs, ProcessOutcome};
pub use runner::{ShutdownHandle, Worker};
