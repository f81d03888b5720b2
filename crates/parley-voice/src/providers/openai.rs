//! OpenAI-compatible `/chat/completions` streaming client.
//!
//! Works against api.openai.com as well as any server speaking the same
//! dialect (llama-server, vLLM, Ollama's `/v1` shim).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::sse;
use crate::backend::{CompletionProvider, CompletionStream};
use crate::error::VoiceError;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

/// Streaming chat completion over an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompletion {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            temperature: 0.7,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, system_prompt: &'a str, utterance: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: utterance,
                },
            ],
            temperature: self.temperature,
            stream: true,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn stream(
        &self,
        system_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, VoiceError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(system_prompt, utterance));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Completion(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Completion(format!("HTTP {status}: {body}")));
        }

        tracing::debug!(model = %self.model, "Completion stream opened");
        Ok(sse::fragments(response.bytes_stream(), extract_delta))
    }
}

/// `choices[0].delta.content` of one chat-completion chunk.
fn extract_delta(value: &Value) -> Result<Option<String>, VoiceError> {
    if let Some(error) = value.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(VoiceError::Completion(message.to_string()));
    }
    Ok(value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}
