use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;
use crate::extraction::FieldSpec;

pub const MAX_FIELDS: usize = 50;
pub const MAX_FIELD_NAME_LEN: usize = 100;
pub const DESCRIPTION_LEN: (usize, usize) = (10, 1000);
pub const PROMPT_LEN: (usize, usize) = (20, 2000);

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "tiff", "bmp", "docx", "doc", "txt", "rtf", "pptx", "ppt",
];

static RE_FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

/// Lowercased extension of `filename`, if any.
pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

pub fn validate_fields(fields: &[FieldSpec]) -> Result<(), ValidationError> {
    if fields.is_empty() {
        return Err(ValidationError::NoFields);
    }
    if fields.len() > MAX_FIELDS {
        return Err(ValidationError::TooManyFields {
            count: fields.len(),
            max: MAX_FIELDS,
        });
    }

    let mut seen = HashSet::new();
    for field in fields {
        let name = field.name.as_str();
        if name.is_empty()
            || name.chars().count() > MAX_FIELD_NAME_LEN
            || !RE_FIELD_NAME.is_match(name)
        {
            return Err(ValidationError::InvalidFieldName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateField(name.to_string()));
        }

        let (min, max) = DESCRIPTION_LEN;
        let len = field.description.trim().chars().count();
        if len < min || len > max {
            return Err(ValidationError::InvalidDescription {
                field: name.to_string(),
                min,
                max,
            });
        }
    }
    Ok(())
}

pub fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    let (min, max) = PROMPT_LEN;
    let len = prompt.trim().chars().count();
    if len < min || len > max {
        return Err(ValidationError::InvalidPrompt { len, min, max });
    }
    Ok(())
}

pub fn validate_format(filename: &str) -> Result<(), ValidationError> {
    match extension(filename) {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ValidationError::UnsupportedFormat(filename.to_string())),
    }
}
