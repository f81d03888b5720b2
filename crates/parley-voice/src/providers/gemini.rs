//! Gemini `streamGenerateContent` client (SSE mode).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::sse;
use crate::backend::{CompletionProvider, CompletionStream};
use crate::error::VoiceError;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

/// Streaming completion against the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiCompletion {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiCompletion {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body<'a>(&self, system_prompt: &'a str, utterance: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_prompt,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: utterance }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    async fn stream(
        &self,
        system_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, VoiceError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(system_prompt, utterance))
            .send()
            .await
            .map_err(|e| VoiceError::Completion(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Completion(format!("HTTP {status}: {body}")));
        }

        tracing::debug!(model = %self.model, "Gemini stream opened");
        Ok(sse::fragments(response.bytes_stream(), extract_candidate))
    }
}

/// Concatenated `candidates[0].content.parts[].text` of one response chunk.
fn extract_candidate(value: &Value) -> Result<Option<String>, VoiceError> {
    if let Some(error) = value.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(VoiceError::Completion(message.to_string()));
    }
    if let Some(reason) = value["promptFeedback"]["blockReason"].as_str() {
        return Err(VoiceError::Completion(format!("prompt blocked: {reason}")));
    }

    let Some(parts) = value["candidates"][0]["content"]["parts"].as_array() else {
        return Ok(None);
    };
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    Ok(Some(text))
}
