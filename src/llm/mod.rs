//! Chat model abstraction used by both stages of the question-answering chain.
//!
//! The Gemini client mirrors the embedding adapter by issuing REST requests directly to
//! `generateContent`; no streaming, retries, or timeouts are layered on top.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider was unreachable or the endpoint does not exist.
    #[error("Chat model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or carried no text.
    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat/completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for a fully rendered prompt.
    async fn generate(&self, prompt: String) -> Result<String, LlmClientError>;
}

/// Gemini `generateContent` client.
pub struct GeminiChatModel {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiChatModel {
    /// Construct a client for the given API base, key, model, and sampling temperature.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self, LlmClientError> {
        let http = Client::builder()
            .user_agent("docura/chat")
            .build()
            .map_err(|error| LlmClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Construct a client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, LlmClientError> {
        Self::new(
            config.gemini_api_base.clone(),
            config.gemini_api_key.clone(),
            config.chat_model.clone(),
            config.chat_temperature,
        )
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, prompt: String) -> Result<String, LlmClientError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        tracing::debug!(model = %self.model, "Requesting completion");
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                LlmClientError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmClientError::ProviderUnavailable(format!(
                "Gemini endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            LlmClientError::InvalidResponse(format!("failed to decode Gemini response: {error}"))
        })?;

        let Some(candidate) = body.candidates.into_iter().next() else {
            return Err(LlmClientError::InvalidResponse(
                "Gemini returned no candidates".into(),
            ));
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmClientError::InvalidResponse(format!(
                "Gemini candidate carried no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text.trim().to_string())
    }
}
