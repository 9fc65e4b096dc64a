//! HTTP client wrapper for interacting with Pinecone.

use crate::config::Config;
use crate::pinecone::{
    store::VectorStore,
    types::{
        DescribeIndexResponse, IndexStatsResponse, PineconeError, QueryResponse, ScoredChunk,
        UpsertResponse, VectorRecord,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;

const API_VERSION: &str = "2024-07";
/// Pinecone recommends upserting at most 100 vectors per request.
const UPSERT_BATCH_SIZE: usize = 100;

/// Lightweight HTTP client for Pinecone operations.
///
/// One instance is built at startup and shared by every request. The data-plane host is looked
/// up by index name on first use and cached for the lifetime of the handle.
pub struct PineconeService {
    pub(crate) client: Client,
    pub(crate) controller_url: String,
    pub(crate) index_name: String,
    pub(crate) api_key: String,
    pub(crate) host: OnceCell<String>,
}

impl PineconeService {
    /// Construct a new client from loaded configuration.
    pub fn new(config: &Config) -> Result<Self, PineconeError> {
        let client = Client::builder().user_agent("docura/0.1").build()?;
        let controller_url = normalize_base_url(&config.pinecone_controller_url)
            .map_err(PineconeError::InvalidUrl)?;
        let host = match config.pinecone_index_host.as_deref() {
            Some(explicit) => Some(normalize_host(explicit)?),
            None => None,
        };

        tracing::debug!(
            index = %config.pinecone_index_name,
            environment = %config.pinecone_environment,
            controller = %controller_url,
            explicit_host = host.is_some(),
            "Initialized Pinecone HTTP client"
        );

        Ok(Self {
            client,
            controller_url,
            index_name: config.pinecone_index_name.clone(),
            api_key: config.pinecone_api_key.clone(),
            host: OnceCell::new_with(host),
        })
    }

    /// Resolve the data-plane host for the configured index, looking it up once by name.
    pub async fn index_host(&self) -> Result<&str, PineconeError> {
        self.host
            .get_or_try_init(|| self.describe_index_host())
            .await
            .map(String::as_str)
    }

    async fn describe_index_host(&self) -> Result<String, PineconeError> {
        let url = format_endpoint(&self.controller_url, &format!("indexes/{}", self.index_name));
        let response = self.request(Method::GET, url).send().await?;
        let response = self.check_status(response, "describe index").await?;
        let described: DescribeIndexResponse = response.json().await?;
        let host = described
            .host
            .filter(|host| !host.trim().is_empty())
            .ok_or_else(|| PineconeError::MissingHost(self.index_name.clone()))?;
        let host = normalize_host(&host)?;
        tracing::info!(index = %self.index_name, host = %host, "Resolved Pinecone index host");
        Ok(host)
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn data_request(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, PineconeError> {
        let host = self.index_host().await?;
        let url = format_endpoint(host, path);
        Ok(self.request(Method::POST, url).json(body).send().await?)
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<reqwest::Response, PineconeError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = PineconeError::UnexpectedStatus { status, body };
            tracing::error!(operation, error = %error, "Pinecone request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for PineconeService {
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, PineconeError> {
        let mut upserted = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<Value> = batch
                .iter()
                .map(|record| {
                    json!({
                        "id": record.id,
                        "values": record.values,
                        "metadata": record.metadata,
                    })
                })
                .collect();
            let body = json!({ "vectors": vectors, "namespace": namespace });
            let response = self.data_request("vectors/upsert", &body).await?;
            let response = self.check_status(response, "upsert").await?;
            let summary: UpsertResponse = response.json().await?;
            upserted += summary.upserted_count.unwrap_or(batch.len());
        }

        tracing::debug!(namespace, vectors = upserted, "Vectors upserted");
        Ok(upserted)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PineconeError> {
        let body = json!({
            "namespace": namespace,
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let response = self.data_request("query", &body).await?;
        let response = self.check_status(response, "query").await?;
        let payload: QueryResponse = response.json().await?;

        Ok(payload
            .matches
            .into_iter()
            .map(|hit| map_match(hit.id, hit.score, hit.metadata))
            .collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, PineconeError> {
        let response = self.data_request("describe_index_stats", &json!({})).await?;
        let response = self.check_status(response, "describe index stats").await?;
        let stats: IndexStatsResponse = response.json().await?;
        let mut names: Vec<String> = stats.namespaces.into_keys().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), PineconeError> {
        let body = json!({ "deleteAll": true, "namespace": namespace });
        let response = self.data_request("vectors/delete", &body).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(namespace, "Namespace already absent");
            return Ok(());
        }
        self.check_status(response, "delete namespace").await?;
        tracing::debug!(namespace, "Namespace deleted");
        Ok(())
    }
}

fn map_match(id: String, score: f32, metadata: Option<Map<String, Value>>) -> ScoredChunk {
    let mut text = None;
    let mut source = None;
    let mut page = None;

    if let Some(mut map) = metadata {
        if let Some(Value::String(value)) = map.remove("text")
            && !value.trim().is_empty()
        {
            text = Some(value);
        }
        if let Some(Value::String(value)) = map.remove("source") {
            source = Some(value);
        }
        page = map
            .get("page")
            .and_then(Value::as_f64)
            .map(|value| value as u32);
    }

    ScoredChunk {
        id,
        score,
        text,
        source,
        page,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

/// Index hosts are reported without a scheme; assume HTTPS unless one is given.
fn normalize_host(host: &str) -> Result<String, PineconeError> {
    let host = host.trim();
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    normalize_base_url(&candidate).map_err(PineconeError::InvalidUrl)
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
