//! Reconciles the primary (A) and secondary (B) backend answers field by field.
//!
//! A is the authority on disagreement. A value only B produced is kept but
//! sent to review.

use std::fmt;

use serde_json::Value;

use super::types::{ExtractionField, FieldSpec, FieldValues, ProcessingMode};

pub const CONFIDENCE_AGREE: f64 = 0.95;
pub const CONFIDENCE_DISAGREE: f64 = 0.8;
pub const CONFIDENCE_PRIMARY_ONLY: f64 = 0.85;
pub const CONFIDENCE_SECONDARY_ONLY: f64 = 0.75;
pub const CONFIDENCE_MISSING: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewFlag {
    Discrepancy {
        field: String,
        primary: Value,
        secondary: Value,
    },
    SecondaryOnly {
        field: String,
    },
    Missing {
        field: String,
    },
}

impl ReviewFlag {
    pub fn field(&self) -> &str {
        match self {
            Self::Discrepancy { field, .. }
            | Self::SecondaryOnly { field }
            | Self::Missing { field } => field,
        }
    }

    pub fn is_discrepancy(&self) -> bool {
        matches!(self, Self::Discrepancy { .. })
    }
}

impl fmt::Display for ReviewFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrepancy {
                field,
                primary,
                secondary,
            } => write!(
                f,
                "Discrepancy in '{}': primary={}, secondary={}",
                field, primary, secondary
            ),
            Self::SecondaryOnly { field } => {
                write!(f, "Field '{}' extracted only by the secondary backend", field)
            }
            Self::Missing { field } => write!(f, "Field '{}' not extracted by any backend", field),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    pub fields: Vec<ExtractionField>,
    pub flags: Vec<ReviewFlag>,
}

/// Merges two value maps into one `ExtractionField` per requested field,
/// in the order of `fields`.
pub fn merge(
    primary: &FieldValues,
    secondary: &FieldValues,
    fields: &[FieldSpec],
    strategy: ProcessingMode,
) -> ConsensusOutcome {
    let mut merged = Vec::with_capacity(fields.len());
    let mut flags = Vec::new();

    for spec in fields {
        let a = present(primary, &spec.name);
        let b = present(secondary, &spec.name);

        let (value, confidence, review_required) = match (a, b) {
            (Some(a), Some(b)) if values_agree(a, b) => (a.clone(), CONFIDENCE_AGREE, false),
            (Some(a), Some(b)) => {
                flags.push(ReviewFlag::Discrepancy {
                    field: spec.name.clone(),
                    primary: a.clone(),
                    secondary: b.clone(),
                });
                (a.clone(), CONFIDENCE_DISAGREE, true)
            }
            (Some(a), None) => (a.clone(), CONFIDENCE_PRIMARY_ONLY, false),
            (None, Some(b)) => {
                flags.push(ReviewFlag::SecondaryOnly {
                    field: spec.name.clone(),
                });
                (b.clone(), CONFIDENCE_SECONDARY_ONLY, true)
            }
            (None, None) => {
                flags.push(ReviewFlag::Missing {
                    field: spec.name.clone(),
                });
                (Value::Null, CONFIDENCE_MISSING, true)
            }
        };

        merged.push(ExtractionField {
            name: spec.name.clone(),
            value,
            confidence,
            review_required,
            source_strategy: strategy,
            extraction_time_ms: 0,
        });
    }

    ConsensusOutcome {
        fields: merged,
        flags,
    }
}

fn present<'a>(values: &'a FieldValues, name: &str) -> Option<&'a Value> {
    values.get(name).filter(|v| !v.is_null())
}

/// Equality with two relaxations: numbers compare numerically (`1` == `1.0`)
/// and strings ignore surrounding whitespace.
pub fn values_agree(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::String(x), Value::String(y)) => x.trim() == y.trim(),
        _ => a == b,
    }
}
