use async_trait::async_trait;

use super::error::BackendError;
use super::types::{FieldSpec, FieldValues, Page};

/// A document-understanding capability: page images plus instructions in,
/// a JSON object of field values out.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Extracts field values from `pages`. Keys missing from the returned map
    /// are treated as "not found".
    async fn extract(
        &self,
        pages: &[Page],
        prompt: &str,
        fields: &[FieldSpec],
    ) -> Result<FieldValues, BackendError>;

    /// Short name used in logs and review flags.
    fn name(&self) -> &str;
}
