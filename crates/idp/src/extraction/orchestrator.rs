//! Strategy dispatch over the two extraction backends.

use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use serde_json::Value;
use tracing::{info_span, Instrument};

use super::backend::ExtractionBackend;
use super::cascade::BatchCascader;
use super::consensus;
use super::error::{BackendError, ExtractionError, RenderError};
use super::prompt;
use super::render::PageRenderer;
use super::types::{
    ExtractionField, ExtractionResult, FieldSpec, FieldValues, Page, ProcessingMode,
};

/// Confidence reported for every field in `single_backend` mode.
pub const SINGLE_BACKEND_CONFIDENCE: f64 = 0.9;

/// Holds no per-request state; one instance serves every job.
pub struct ExtractionOrchestrator {
    primary: Arc<dyn ExtractionBackend>,
    secondary: Arc<dyn ExtractionBackend>,
    renderer: Arc<dyn PageRenderer>,
    cascader: BatchCascader,
}

impl ExtractionOrchestrator {
    pub fn new(
        primary: Arc<dyn ExtractionBackend>,
        secondary: Arc<dyn ExtractionBackend>,
        renderer: Arc<dyn PageRenderer>,
        cascader: BatchCascader,
    ) -> Self {
        Self {
            primary,
            secondary,
            renderer,
            cascader,
        }
    }

    /// Parses `mode` and runs the matching strategy.
    pub async fn process(
        &self,
        document: &[u8],
        filename: &str,
        fields: &[FieldSpec],
        prompt: &str,
        mode: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let mode: ProcessingMode = mode.parse()?;
        self.process_mode(document, filename, fields, prompt, mode)
            .await
    }

    pub async fn process_mode(
        &self,
        document: &[u8],
        filename: &str,
        fields: &[FieldSpec],
        prompt: &str,
        mode: ProcessingMode,
    ) -> Result<ExtractionResult, ExtractionError> {
        let started = Instant::now();
        let span = info_span!("extraction", mode = %mode, fields = fields.len());

        async move {
            let pages = self.render(document, filename).await?;
            info!(
                "Extracting {} field(s) from {} page(s) using {}",
                fields.len(),
                pages.len(),
                mode
            );

            let (mut extracted, review_flags) = match mode {
                ProcessingMode::SingleBackend => {
                    (self.single(&pages, fields, prompt).await?, Vec::new())
                }
                ProcessingMode::DualBackendParallel => {
                    self.dual_parallel(&pages, fields, prompt).await?
                }
                ProcessingMode::HybridConsensus => self.hybrid(&pages, fields, prompt).await?,
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            for field in &mut extracted {
                field.extraction_time_ms = elapsed_ms;
            }

            Ok(ExtractionResult {
                fields: extracted,
                pages_processed: pages.len(),
                review_flags,
                strategy: mode,
                extraction_time_ms: elapsed_ms,
            })
        }
        .instrument(span)
        .await
    }

    async fn render(&self, document: &[u8], filename: &str) -> Result<Vec<Page>, ExtractionError> {
        let renderer = Arc::clone(&self.renderer);
        let bytes = document.to_vec();
        let name = filename.to_string();
        let pages = tokio::task::spawn_blocking(move || renderer.render(&bytes, &name))
            .instrument(info_span!("render"))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;
        Ok(pages)
    }

    async fn single(
        &self,
        pages: &[Page],
        fields: &[FieldSpec],
        prompt: &str,
    ) -> Result<Vec<ExtractionField>, ExtractionError> {
        let output = self
            .cascader
            .extract(self.primary.as_ref(), pages, fields, prompt)
            .await
            .map_err(|e| backend_error(self.primary.as_ref(), e))?;

        Ok(fields
            .iter()
            .map(|spec| ExtractionField {
                name: spec.name.clone(),
                value: output.values.get(&spec.name).cloned().unwrap_or(Value::Null),
                confidence: SINGLE_BACKEND_CONFIDENCE,
                review_required: false,
                source_strategy: ProcessingMode::SingleBackend,
                extraction_time_ms: 0,
            })
            .collect())
    }

    /// Both backends run concurrently. One failure is tolerated and noted;
    /// two are fatal.
    async fn dual_parallel(
        &self,
        pages: &[Page],
        fields: &[FieldSpec],
        prompt: &str,
    ) -> Result<(Vec<ExtractionField>, Vec<String>), ExtractionError> {
        let secondary_prompt = prompt::batch_prompt(prompt, fields, pages.len());
        let (primary, secondary) = tokio::join!(
            self.cascader.extract(self.primary.as_ref(), pages, fields, prompt),
            self.secondary
                .extract(pages, &secondary_prompt, fields)
                .instrument(info_span!("secondary", backend = self.secondary.name())),
        );

        let mut notes = Vec::new();
        let (primary_values, secondary_values) = match (primary, secondary) {
            (Err(a), Err(b)) => {
                return Err(ExtractionError::BothBackendsFailed {
                    primary: self.primary.name().to_string(),
                    source: a,
                    secondary: self.secondary.name().to_string(),
                    secondary_error: b,
                })
            }
            (Ok(a), Ok(b)) => (a.values, b),
            (Ok(a), Err(b)) => {
                notes.push(self.failure_note(self.secondary.as_ref(), &b));
                (a.values, FieldValues::new())
            }
            (Err(a), Ok(b)) => {
                notes.push(self.failure_note(self.primary.as_ref(), &a));
                (FieldValues::new(), b)
            }
        };

        let outcome = consensus::merge(
            &primary_values,
            &secondary_values,
            fields,
            ProcessingMode::DualBackendParallel,
        );
        let mut flags: Vec<String> = outcome
            .flags
            .iter()
            .filter(|f| f.is_discrepancy())
            .map(|f| f.to_string())
            .collect();
        flags.extend(notes);
        Ok((outcome.fields, flags))
    }

    /// Primary then secondary, one after the other. Any backend failure is fatal.
    async fn hybrid(
        &self,
        pages: &[Page],
        fields: &[FieldSpec],
        prompt: &str,
    ) -> Result<(Vec<ExtractionField>, Vec<String>), ExtractionError> {
        let primary = self
            .cascader
            .extract(self.primary.as_ref(), pages, fields, prompt)
            .await
            .map_err(|e| backend_error(self.primary.as_ref(), e))?;

        let secondary_prompt = prompt::batch_prompt(prompt, fields, pages.len());
        let secondary = self
            .secondary
            .extract(pages, &secondary_prompt, fields)
            .instrument(info_span!("secondary", backend = self.secondary.name()))
            .await
            .map_err(|e| backend_error(self.secondary.as_ref(), e))?;

        let outcome = consensus::merge(
            &primary.values,
            &secondary,
            fields,
            ProcessingMode::HybridConsensus,
        );
        let flags = outcome.flags.iter().map(|f| f.to_string()).collect();
        Ok((outcome.fields, flags))
    }

    fn failure_note(&self, backend: &dyn ExtractionBackend, error: &BackendError) -> String {
        warn!(
            "Backend '{}' failed, continuing with the other backend: {}",
            backend.name(),
            error
        );
        format!("Backend '{}' failed: {}", backend.name(), error)
    }
}

fn backend_error(backend: &dyn ExtractionBackend, source: BackendError) -> ExtractionError {
    ExtractionError::Backend {
        backend: backend.name().to_string(),
        source,
    }
}
