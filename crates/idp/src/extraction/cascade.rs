//! Batched extraction for multi-page documents.
//!
//! Documents up to `batch_size` pages go out in one call. Longer documents are
//! split into consecutive batches; each later batch sees the values found so
//! far and its output is folded into the accumulator with [`merge_batch`].

use tracing::{debug, info_span, Instrument};

use super::backend::ExtractionBackend;
use super::error::BackendError;
use super::prompt;
use super::types::{FieldSpec, FieldValues, Page};

pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutput {
    pub values: FieldValues,
    pub pages_processed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchCascader {
    batch_size: usize,
}

impl Default for BatchCascader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchCascader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn extract(
        &self,
        backend: &dyn ExtractionBackend,
        pages: &[Page],
        fields: &[FieldSpec],
        base_prompt: &str,
    ) -> Result<CascadeOutput, BackendError> {
        if pages.len() <= self.batch_size {
            let span = info_span!("cascade.single", backend = backend.name(), pages = pages.len());
            let text = prompt::batch_prompt(base_prompt, fields, pages.len());
            let values = backend
                .extract(pages, &text, fields)
                .instrument(span)
                .await?;
            return Ok(CascadeOutput {
                values: strip_metadata(values),
                pages_processed: pages.len(),
            });
        }

        let mut batches = pages.chunks(self.batch_size);
        let mut accumulated = FieldValues::new();
        let mut covered = 0usize;

        if let Some(first) = batches.next() {
            let span = info_span!("cascade.batch", backend = backend.name(), batch = 1usize);
            let text = prompt::batch_prompt(base_prompt, fields, first.len());
            let values = backend
                .extract(first, &text, fields)
                .instrument(span)
                .await?;
            merge_batch(&mut accumulated, values);
            covered = first.len();
        }

        for (index, batch) in batches.enumerate() {
            let first_page = covered + 1;
            let last_page = covered + batch.len();
            let span = info_span!(
                "cascade.batch",
                backend = backend.name(),
                batch = index + 2,
                pages = %format!("{}-{}", first_page, last_page),
            );

            let context =
                prompt::cascade_prompt(base_prompt, &accumulated, covered, first_page, last_page);
            let text = prompt::batch_prompt(&context, fields, batch.len());
            let values = backend
                .extract(batch, &text, fields)
                .instrument(span)
                .await?;
            merge_batch(&mut accumulated, values);
            covered = last_page;

            debug!(
                "Cascade batch {} merged, {} keys accumulated",
                index + 2,
                accumulated.len()
            );
        }

        Ok(CascadeOutput {
            values: accumulated,
            pages_processed: pages.len(),
        })
    }
}

/// Folds one batch into the accumulator.
///
/// Non-null values replace what is there; null values only fill keys that
/// are not present yet. Metadata keys are dropped.
pub fn merge_batch(accumulated: &mut FieldValues, batch: FieldValues) {
    for (key, value) in batch {
        if prompt::is_metadata_key(&key) {
            continue;
        }
        if !value.is_null() || !accumulated.contains_key(&key) {
            accumulated.insert(key, value);
        }
    }
}

fn strip_metadata(values: FieldValues) -> FieldValues {
    values
        .into_iter()
        .filter(|(key, _)| !prompt::is_metadata_key(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::FieldType;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn map(value: Value) -> FieldValues {
        value.as_object().cloned().unwrap()
    }

    fn pages(n: usize) -> Vec<Page> {
        (1..=n)
            .map(|number| Page {
                number,
                png: vec![number as u8],
            })
            .collect()
    }

    /// Replays scripted responses and records what each call saw.
    struct ScriptedBackend {
        responses: Mutex<Vec<FieldValues>>,
        calls: Mutex<Vec<(Vec<usize>, String)>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(map).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        async fn extract(
            &self,
            pages: &[Page],
            prompt: &str,
            _fields: &[FieldSpec],
        ) -> Result<FieldValues, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((pages.iter().map(|p| p.number).collect(), prompt.to_string()));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(BackendError::Unavailable("script exhausted".into()));
            }
            Ok(responses.remove(0))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("a", FieldType::Number, "First value"),
            FieldSpec::new("b", FieldType::Number, "Second value"),
        ]
    }

    #[test]
    fn test_merge_fills_and_overwrites_with_non_null() {
        let mut acc = map(json!({"a": 1, "b": null}));
        merge_batch(&mut acc, map(json!({"b": 2, "c": 3})));
        assert_eq!(Value::Object(acc), json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_merge_null_never_overwrites() {
        let mut acc = map(json!({"a": 1}));
        merge_batch(&mut acc, map(json!({"a": null})));
        assert_eq!(Value::Object(acc), json!({"a": 1}));
    }

    #[test]
    fn test_merge_null_inserts_missing_key() {
        let mut acc = FieldValues::new();
        merge_batch(&mut acc, map(json!({"a": null, "_rid": "x"})));
        assert_eq!(Value::Object(acc), json!({"a": null}));
    }

    #[tokio::test]
    async fn test_small_document_is_one_call() {
        let backend = ScriptedBackend::new(vec![json!({"a": 1, "b": 2, "pages_processed": 3})]);
        let out = BatchCascader::default()
            .extract(&backend, &pages(5), &fields(), "Extract values")
            .await
            .unwrap();

        assert_eq!(out.pages_processed, 5);
        assert_eq!(Value::Object(out.values), json!({"a": 1, "b": 2}));
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_large_document_cascades_with_context() {
        let backend = ScriptedBackend::new(vec![
            json!({"a": 1, "b": null}),
            json!({"b": 2}),
            json!({"a": null, "c": 3}),
        ]);
        let out = BatchCascader::new(5)
            .extract(&backend, &pages(12), &fields(), "Extract values")
            .await
            .unwrap();

        assert_eq!(out.pages_processed, 12);
        assert_eq!(Value::Object(out.values), json!({"a": 1, "b": 2, "c": 3}));

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls[1].0, vec![6, 7, 8, 9, 10]);
        assert_eq!(calls[2].0, vec![11, 12]);
        assert!(!calls[0].1.contains("Previous extraction"));
        assert!(calls[1].1.contains("Previous extraction (pages 1-5):"));
        assert!(calls[1].1.contains("- a: 1"));
        assert!(calls[2].1.contains("Previous extraction (pages 1-10):"));
        assert!(calls[2].1.contains("- b: 2"));
        assert!(calls[2].1.contains("pages 11-12"));
    }

    #[tokio::test]
    async fn test_batch_failure_propagates() {
        let backend = ScriptedBackend::new(vec![json!({"a": 1})]);
        let result = BatchCascader::new(2)
            .extract(&backend, &pages(3), &fields(), "Extract values")
            .await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }
}
