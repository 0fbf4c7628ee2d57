//! Queue and dead-letter payloads.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::extraction::FieldSpec;
use crate::sanitize::redact_object_name;

/// Work item for one asynchronous job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: String,
    pub object_path: String,
    /// Kept as text so an unknown mode still reaches the worker and fails
    /// the job instead of being rejected as a malformed message.
    pub processing_mode: String,
    pub prompt: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default = "default_persistence", deserialize_with = "lenient_bool")]
    pub persistence: bool,
    #[serde(default)]
    pub file_size_mb: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_persistence() -> bool {
    true
}

/// `"false"`, `"0"`, `"no"` and `"off"` (any case) mean false; every other
/// value, including null, means true.
pub fn parse_persistence(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::String(s) => parse_persistence(&s),
        Value::Number(n) => n.as_f64().is_none_or(|v| v != 0.0),
        _ => true,
    })
}

impl QueueMessage {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Name used for format detection and the document record.
    pub fn filename(&self) -> &str {
        redact_object_name(&self.object_path)
    }
}

/// Builds the dead-letter body: the original JSON object with failure
/// metadata added. Bodies that are not a JSON object are kept under
/// `raw_body`.
pub fn dead_letter_body(
    raw_body: &str,
    error_message: &str,
    original_queue: &str,
    failed_at: DateTime<Utc>,
) -> Value {
    let mut payload = match serde_json::from_str::<Value>(raw_body) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("raw_body".to_string(), Value::String(raw_body.to_string()));
            map
        }
    };

    let retry_count = payload
        .get("retry_count")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        + 1;

    payload.insert(
        "failed_at".to_string(),
        Value::String(failed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    payload.insert(
        "error_message".to_string(),
        Value::String(error_message.to_string()),
    );
    payload.insert(
        "original_queue".to_string(),
        Value::String(original_queue.to_string()),
    );
    payload.insert("retry_count".to_string(), Value::from(retry_count));

    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(persistence: Value) -> String {
        json!({
            "job_id": "job-1",
            "object_path": "job-1/20260101_120000_invoice.pdf",
            "processing_mode": "single_backend",
            "prompt": "Extract the invoice header fields please",
            "fields": [{"name": "total", "type": "number", "description": "Invoice grand total"}],
            "persistence": persistence,
            "file_size_mb": 12.5,
            "created_at": "2026-01-01T12:00:00Z"
        })
        .to_string()
    }

    #[test]
    fn test_parse_message() {
        let msg = QueueMessage::parse(&body(json!("true"))).unwrap();
        assert_eq!(msg.job_id, "job-1");
        assert_eq!(msg.fields.len(), 1);
        assert_eq!(msg.file_size_mb, 12.5);
        assert!(msg.persistence);
        assert_eq!(msg.filename(), "20260101_120000_invoice.pdf");
    }

    #[test]
    fn test_persistence_is_lenient() {
        for falsy in ["false", "FALSE", " no ", "0", "Off"] {
            let msg = QueueMessage::parse(&body(json!(falsy))).unwrap();
            assert!(!msg.persistence, "{falsy}");
        }
        for truthy in [
            json!("true"),
            json!("yes"),
            json!("maybe"),
            json!(true),
            json!(1),
            Value::Null,
        ] {
            let msg = QueueMessage::parse(&body(truthy.clone())).unwrap();
            assert!(msg.persistence, "{truthy}");
        }
        assert!(!QueueMessage::parse(&body(json!(false))).unwrap().persistence);
        assert!(!QueueMessage::parse(&body(json!(0))).unwrap().persistence);
    }

    #[test]
    fn test_absent_persistence_defaults_true() {
        let mut value: Value = serde_json::from_str(&body(json!("false"))).unwrap();
        value.as_object_mut().unwrap().remove("persistence");
        let msg = QueueMessage::parse(&value.to_string()).unwrap();
        assert!(msg.persistence);
    }

    #[test]
    fn test_unknown_mode_still_parses() {
        let mut value: Value = serde_json::from_str(&body(json!("true"))).unwrap();
        value["processing_mode"] = json!("quantum");
        let msg = QueueMessage::parse(&value.to_string()).unwrap();
        assert_eq!(msg.processing_mode, "quantum");
    }

    #[test]
    fn test_dead_letter_keeps_original_fields() {
        let failed_at = Utc::now();
        let dlq = dead_letter_body(
            &body(json!("false")),
            "boom",
            "idp-processing-queue",
            failed_at,
        );

        assert_eq!(dlq["job_id"], "job-1");
        assert_eq!(dlq["persistence"], "false");
        assert_eq!(dlq["error_message"], "boom");
        assert_eq!(dlq["original_queue"], "idp-processing-queue");
        assert_eq!(dlq["retry_count"], 1);
        assert!(dlq["failed_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_dead_letter_increments_retry_count() {
        let raw = json!({"job_id": "job-1", "retry_count": 2}).to_string();
        let dlq = dead_letter_body(&raw, "again", "q", Utc::now());
        assert_eq!(dlq["retry_count"], 3);
    }

    #[test]
    fn test_dead_letter_wraps_unparseable_body() {
        let dlq = dead_letter_body("not json at all", "bad message", "q", Utc::now());
        assert_eq!(dlq["raw_body"], "not json at all");
        assert_eq!(dlq["retry_count"], 1);
    }
}
