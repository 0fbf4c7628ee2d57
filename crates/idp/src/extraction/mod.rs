//! Field extraction: page rendering, backend calls, batching and consensus.

pub mod backend;
pub mod cascade;
pub mod consensus;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod prompt;
pub mod render;
pub mod types;

pub use backend::ExtractionBackend;
pub use cascade::{merge_batch, BatchCascader, CascadeOutput, DEFAULT_BATCH_SIZE};
pub use consensus::{ConsensusOutcome, ReviewFlag};
pub use error::{BackendError, ExtractionError, RenderError};
pub use http::{ChatBackendSettings, ChatVisionBackend};
pub use orchestrator::ExtractionOrchestrator;
pub use render::{DefaultPageRenderer, PageRenderer};
pub use types::{
    ExtractionField, ExtractionResult, FieldSpec, FieldType, FieldValues, Page, ProcessingMode,
};
