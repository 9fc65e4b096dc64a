use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gemini rejects batch embedding requests with more than 100 entries.
const MAX_BATCH_SIZE: usize = 100;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client backed by the Gemini `batchEmbedContents` endpoint.
pub struct GeminiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbeddingClient {
    /// Construct a client for the given API base, key, and model.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docura/embedding")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Construct a client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        Self::new(
            config.gemini_api_base.clone(),
            config.gemini_api_key.clone(),
            config.embedding_model.clone(),
        )
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model_path()
        )
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let model = self.model_path();
        let request = BatchEmbedRequest {
            requests: batch
                .iter()
                .map(|text| EmbedRequest {
                    model: &model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                })
                .collect(),
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: BatchEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Gemini response: {error}"
            ))
        })?;

        if body.embeddings.len() != batch.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, received {}",
                batch.len(),
                body.embeddings.len()
            )));
        }

        Ok(body
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            "Generating embeddings"
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    const ENDPOINT: &str = "/v1beta/models/text-embedding-004:batchEmbedContents";

    #[tokio::test]
    async fn gemini_client_returns_vectors_in_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(ENDPOINT)
                    .header("x-goog-api-key", "test-key")
                    .json_body(json!({
                        "requests": [
                            {
                                "model": "models/text-embedding-004",
                                "content": { "parts": [{ "text": "alpha" }] }
                            },
                            {
                                "model": "models/text-embedding-004",
                                "content": { "parts": [{ "text": "beta" }] }
                            }
                        ]
                    }));
                then.status(200).json_body(json!({
                    "embeddings": [
                        { "values": [0.1, 0.2] },
                        { "values": [0.3, 0.4] }
                    ]
                }));
            })
            .await;

        let client =
            GeminiEmbeddingClient::new(server.base_url(), "test-key", "text-embedding-004")
                .expect("client");
        let vectors = client
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1_f32, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn gemini_client_splits_large_inputs_into_batches() {
        let server = MockServer::start_async().await;
        let values: Vec<_> = (0..MAX_BATCH_SIZE).map(|_| json!({ "values": [1.0] })).collect();
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(200).json_body(json!({ "embeddings": values }));
            })
            .await;

        let client =
            GeminiEmbeddingClient::new(server.base_url(), "test-key", "text-embedding-004")
                .expect("client");
        let texts: Vec<String> = (0..MAX_BATCH_SIZE * 2).map(|i| format!("chunk {i}")).collect();
        let vectors = client.generate_embeddings(texts).await.expect("embeddings");

        mock.assert_hits_async(2).await;
        assert_eq!(vectors.len(), MAX_BATCH_SIZE * 2);
    }

    #[tokio::test]
    async fn gemini_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(429).body("quota exceeded");
            })
            .await;

        let client =
            GeminiEmbeddingClient::new(server.base_url(), "test-key", "text-embedding-004")
                .expect("client");
        let error = client
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("error response");

        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(ref message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn gemini_client_rejects_count_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(200).json_body(json!({ "embeddings": [] }));
            })
            .await;

        let client =
            GeminiEmbeddingClient::new(server.base_url(), "test-key", "text-embedding-004")
                .expect("client");
        let error = client
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("mismatch");

        assert!(matches!(error, EmbeddingClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_network() {
        let client = GeminiEmbeddingClient::new("http://127.0.0.1:9", "key", "text-embedding-004")
            .expect("client");
        let error = client.generate_embeddings(Vec::new()).await.expect_err("empty");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }
}
