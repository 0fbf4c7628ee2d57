//! Chat-completions vision backend (OpenAI-compatible `/chat/completions`).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::backend::ExtractionBackend;
use super::error::BackendError;
use super::types::{FieldSpec, FieldValues, Page};

const SYSTEM_PROMPT: &str = "You extract structured data from document page images. \
Always answer with one JSON object and nothing else.";

/// Connection settings for one chat backend.
#[derive(Debug)]
pub struct ChatBackendSettings {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct ChatVisionBackend {
    settings: ChatBackendSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatVisionBackend {
    pub fn new(settings: ChatBackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { settings, client })
    }

    fn completions_url(&self) -> String {
        let base = self.settings.endpoint.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

#[async_trait]
impl ExtractionBackend for ChatVisionBackend {
    async fn extract(
        &self,
        pages: &[Page],
        prompt: &str,
        _fields: &[FieldSpec],
    ) -> Result<FieldValues, BackendError> {
        let mut parts = Vec::with_capacity(pages.len() + 1);
        parts.push(ContentPart::Text {
            text: prompt.to_string(),
        });
        for page in pages {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", BASE64.encode(&page.png)),
                    detail: "high",
                },
            });
        }

        let body = ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
        };

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request
                .bearer_auth(key.expose_secret())
                .header("api-key", key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::MalformedResponse("response has no content".into()))?;

        log::debug!(
            "Backend '{}' answered {} chars for {} page(s)",
            self.settings.name,
            content.len(),
            pages.len()
        );
        parse_json_object(&content)
    }

    fn name(&self) -> &str {
        &self.settings.name
    }
}

/// Pulls a JSON object out of model output, tolerating a fenced
/// ```json block or prose around the braces.
pub fn parse_json_object(content: &str) -> Result<FieldValues, BackendError> {
    let trimmed = content.trim();
    let candidate = if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        match after.find("```") {
            Some(end) => after[..end].trim(),
            None => after.trim(),
        }
    } else {
        trimmed
    };

    let candidate = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => {
            return Err(BackendError::MalformedResponse(format!(
                "no JSON object in response: {}",
                truncate(content, 200)
            )))
        }
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BackendError::MalformedResponse(
            "response JSON is not an object".into(),
        )),
        Err(e) => Err(BackendError::MalformedResponse(format!(
            "invalid JSON: {}",
            e
        ))),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
