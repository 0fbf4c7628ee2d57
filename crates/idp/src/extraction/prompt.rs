//! Prompt text sent to extraction backends.

use std::fmt::Write;

use super::types::{FieldSpec, FieldValues};

/// Keys that backends or storage layers add and that never describe the document.
const METADATA_KEYS: &[&str] = &["pages_processed", "multi_page_analysis", "total_pages_analyzed"];

pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with('_') || METADATA_KEYS.contains(&key)
}

/// Renders the field list, one `- name (type): description` line per field.
pub fn fields_description(fields: &[FieldSpec]) -> String {
    let mut out = String::from("Fields to extract:\n");
    for field in fields {
        let _ = writeln!(
            out,
            "- {} ({}): {}",
            field.name, field.field_type, field.description
        );
    }
    out
}

/// Full prompt for one backend call covering `page_count` pages.
pub fn batch_prompt(base_prompt: &str, fields: &[FieldSpec], page_count: usize) -> String {
    let mut out = String::new();
    out.push_str(base_prompt.trim());
    out.push_str("\n\n");
    out.push_str(&fields_description(fields));
    out.push('\n');
    if page_count > 1 {
        let _ = writeln!(
            out,
            "You are looking at {} pages of the same document.",
            page_count
        );
        out.push_str(
            "- Combine and consolidate the information from ALL pages.\n\
             - A field found on any page satisfies it; if it appears on several pages \
             use the most complete value.\n\
             - Do not return null for a field unless it appears on NO page.\n",
        );
    }
    out.push_str(
        "Reply with a single JSON object whose keys are the field names above. \
         Use null for fields that are not present.\n",
    );
    out
}

/// Base prompt for a later cascade batch: carries the accumulated values
/// from pages `1..=previous_last_page` and asks for pages `first..=last`.
pub fn cascade_prompt(
    base_prompt: &str,
    previous: &FieldValues,
    previous_last_page: usize,
    first: usize,
    last: usize,
) -> String {
    let mut out = String::new();
    out.push_str(base_prompt.trim());
    let _ = write!(
        out,
        "\n\nPrevious extraction (pages 1-{}):\n{}\n\n",
        previous_last_page,
        format_previous(previous)
    );
    let _ = writeln!(
        out,
        "- Complement the previous information using pages {}-{}.",
        first, last
    );
    out.push_str(
        "- If the new pages contradict it, prefer the more recent page.\n\
         - Keep coherence with the data already extracted.\n\
         - Add fields that were not found before.",
    );
    out
}

/// `- key: value` lines for every non-null, non-metadata entry.
pub fn format_previous(values: &FieldValues) -> String {
    let lines: Vec<String> = values
        .iter()
        .filter(|(key, value)| !value.is_null() && !is_metadata_key(key))
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("- {}: {}", key, s),
            other => format!("- {}: {}", key, other),
        })
        .collect();
    if lines.is_empty() {
        "(nothing extracted yet)".to_string()
    } else {
        lines.join("\n")
    }
}
