use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ExtractionError;

/// Field name to extracted value. Missing or unknown values are `null`.
pub type FieldValues = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Date,
    Number,
    Boolean,
    Array,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Date => "date",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
        };
        f.write_str(s)
    }
}

/// A caller-defined field to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    SingleBackend,
    DualBackendParallel,
    HybridConsensus,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleBackend => "single_backend",
            Self::DualBackendParallel => "dual_backend_parallel",
            Self::HybridConsensus => "hybrid_consensus",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = ExtractionError;

    /// Accepts the canonical names plus the legacy `gpt_vision_only` and
    /// `dual_service` spellings still found in older queue payloads.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "single_backend" | "gpt_vision_only" => Ok(Self::SingleBackend),
            "dual_backend_parallel" | "dual_service" => Ok(Self::DualBackendParallel),
            "hybrid_consensus" => Ok(Self::HybridConsensus),
            other => Err(ExtractionError::UnsupportedMode(other.to_string())),
        }
    }
}

/// One extracted field with its confidence assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionField {
    pub name: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    pub review_required: bool,
    pub source_strategy: ProcessingMode,
    pub extraction_time_ms: u64,
}

/// A rendered page image (PNG bytes), numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub png: Vec<u8>,
}

/// Output of one orchestrated extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub fields: Vec<ExtractionField>,
    pub pages_processed: usize,
    pub review_flags: Vec<String>,
    pub strategy: ProcessingMode,
    pub extraction_time_ms: u64,
}

impl ExtractionResult {
    /// Number of fields that came back with a non-null value.
    pub fn fields_extracted(&self) -> usize {
        self.fields.iter().filter(|f| !f.value.is_null()).count()
    }
}
