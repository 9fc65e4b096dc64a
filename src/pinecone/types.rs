//! Shared types used by the Pinecone client and the pipeline.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors returned while interacting with Pinecone.
#[derive(Debug, Error)]
pub enum PineconeError {
    /// Base URL or index host failed to parse or normalize.
    #[error("Invalid Pinecone URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Pinecone responded with an unexpected status code.
    #[error("Unexpected Pinecone response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Pinecone.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Control plane described the index without a data-plane host.
    #[error("Pinecone index '{0}' has no host; is it still initializing?")]
    MissingHost(String),
}

/// Metadata stored alongside every chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Chunk text, read back to build the answer context.
    pub text: String,
    /// Original file name of the uploaded PDF.
    pub source: String,
    /// 1-based page number the chunk was cut from.
    pub page: u32,
    /// Position of the chunk within its page.
    pub chunk_index: u32,
    /// SHA-256 digest of the chunk text.
    pub chunk_hash: String,
    /// RFC3339 ingestion timestamp.
    pub ingested_at: String,
}

/// Vector ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Unique vector identifier.
    pub id: String,
    /// Embedding values.
    pub values: Vec<f32>,
    /// Metadata persisted with the vector.
    pub metadata: ChunkMetadata,
}

/// Retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Identifier assigned at upsert time.
    pub id: String,
    /// Similarity score reported by Pinecone.
    pub score: f32,
    /// Stored chunk text, if present.
    pub text: Option<String>,
    /// Stored source file name, if present.
    pub source: Option<String>,
    /// Stored page number, if present.
    pub page: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct DescribeIndexResponse {
    #[serde(default)]
    pub(crate) host: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    pub(crate) upserted_count: Option<usize>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
pub(crate) struct QueryMatch {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct IndexStatsResponse {
    #[serde(default)]
    pub(crate) namespaces: HashMap<String, NamespaceSummary>,
}

#[derive(Deserialize)]
pub(crate) struct NamespaceSummary {
    #[serde(rename = "vectorCount", default)]
    pub(crate) _vector_count: u64,
}
