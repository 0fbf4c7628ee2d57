//! Builders for test data.

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::Utc;

use idp::config::Config;
use idp::extraction::{FieldSpec, FieldType};
use idp::worker::message::QueueMessage;

/// The two fields the default fake backends answer.
pub fn invoice_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(
            "invoice_number",
            FieldType::String,
            "Invoice identifier printed in the header",
        ),
        FieldSpec::new("total", FieldType::Number, "Grand total including taxes"),
    ]
}

pub const INVOICE_PROMPT: &str = "Extract the invoice header fields from this document";

/// Builder for `QueueMessage` instances.
pub struct MessageBuilder {
    message: QueueMessage,
}

impl MessageBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            message: QueueMessage {
                job_id: job_id.to_string(),
                object_path: format!("{}/20260101_120000_invoice.pdf", job_id),
                processing_mode: "single_backend".to_string(),
                prompt: INVOICE_PROMPT.to_string(),
                fields: invoice_fields(),
                persistence: true,
                file_size_mb: 12.0,
                created_at: Utc::now(),
            },
        }
    }

    pub fn mode(mut self, mode: &str) -> Self {
        self.message.processing_mode = mode.to_string();
        self
    }

    pub fn persistence(mut self, persistence: bool) -> Self {
        self.message.persistence = persistence;
        self
    }

    pub fn fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.message.fields = fields;
        self
    }

    pub fn object_path(mut self, path: &str) -> Self {
        self.message.object_path = path.to_string();
        self
    }

    pub fn build(self) -> QueueMessage {
        self.message
    }
}

/// Builder for `Config` with fast test timings: no read delay, one retry,
/// one-second polling.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.retry.initial_delay_secs = 0.0;
        config.retry.max_retries = 1;
        config.retry.backoff_factor = 1.0;
        config.queue.polling_interval_secs = 1;
        config.queue.visibility_timeout_secs = 30;
        Self { config }
    }

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.root = root;
        self
    }

    pub fn sync_threshold_mb(mut self, mb: f64) -> Self {
        self.config.processing.sync_threshold_mb = mb;
        self
    }

    pub fn max_processing_secs(mut self, secs: u64) -> Self {
        self.config.processing.max_processing_secs = secs;
        self
    }

    pub fn copy_to_processed(mut self, enabled: bool) -> Self {
        self.config.storage.copy_to_processed = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
