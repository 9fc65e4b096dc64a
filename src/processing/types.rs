//! Core data types and error definitions for the ingestion and query pipelines.

use crate::{embedding::EmbeddingClientError, llm::LlmClientError, pinecone::PineconeError};
use anyhow::Error as TokenizerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Configuration asked for an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer tables could not be loaded for token-based sizing.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors produced while extracting text from a PDF.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Neither the page-level nor the whole-document extractor could parse the file.
    #[error("unreadable PDF: {0}")]
    Unreadable(String),
    /// File could not be read from local storage.
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    /// Blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors raised while wiring the service at startup.
#[derive(Debug, Error)]
pub enum InitError {
    /// Embedding client could not be constructed.
    #[error("embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Chat model client could not be constructed.
    #[error("chat model: {0}")]
    Chat(#[from] LlmClientError),
    /// Pinecone client could not be constructed or the index host could not be resolved.
    #[error("vector store: {0}")]
    VectorStore(#[from] PineconeError),
    /// Text splitter could not be constructed.
    #[error("text splitter: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Whether a pipeline failure was caused by the caller or by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request content is unusable; safe to report back verbatim.
    Validation,
    /// Extraction, provider, or index failure; details stay in the logs.
    Upstream,
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Request carried no files.
    #[error("No PDF files provided")]
    NoFiles,
    /// A file could not be loaded.
    #[error("Failed to load '{file_name}': {source}")]
    Load {
        /// Original name of the failing upload.
        file_name: String,
        /// Underlying extraction error.
        #[source]
        source: LoaderError,
    },
    /// Every page of every file came out empty.
    #[error("No extractable text found in the uploaded PDFs")]
    NoExtractableText,
    /// Chunking step failed.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Provider returned a different number of vectors than chunks sent.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Chunks submitted.
        expected: usize,
        /// Vectors returned.
        actual: usize,
    },
    /// Vector index write failed.
    #[error("Pinecone request failed: {0}")]
    VectorStore(#[from] PineconeError),
}

impl IngestError {
    /// Classify the failure for the HTTP layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFiles | Self::NoExtractableText => ErrorKind::Validation,
            _ => ErrorKind::Upstream,
        }
    }
}

/// Errors emitted by the query pipeline.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Question was missing or blank.
    #[error("question is required")]
    EmptyQuestion,
    /// Embedding provider failed for the standalone question.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the question")]
    EmptyEmbedding,
    /// Similarity search failed.
    #[error("Pinecone request failed: {0}")]
    VectorStore(#[from] PineconeError),
    /// Condensation or answering stage failed.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] LlmClientError),
}

impl QueryError {
    /// Classify the failure for the HTTP layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuestion => ErrorKind::Validation,
            _ => ErrorKind::Upstream,
        }
    }
}

/// PDF received over HTTP and parked on local disk for the duration of a request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name supplied by the browser.
    pub original_name: String,
    /// Location of the stored bytes.
    pub path: PathBuf,
    /// MIME type declared for the part.
    pub content_type: String,
}

/// Summary of a completed ingestion produced by [`crate::processing::RagService::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Namespace minted for this upload.
    pub namespace: String,
    /// Number of files ingested.
    pub documents: usize,
    /// Number of pages that carried text.
    pub pages: usize,
    /// Vectors written to the index.
    pub chunks_indexed: usize,
    /// Chunks skipped because an identical chunk appeared earlier in the upload.
    pub skipped_duplicates: usize,
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Person asking questions.
    User,
    /// Model answers.
    Assistant,
}

/// One prior exchange in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who spoke.
    pub role: ChatRole,
    /// What was said.
    pub text: String,
}

/// Parameters supplied to the query pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    /// Latest user question.
    #[serde(default)]
    pub question: String,
    /// Namespace returned by a previous upload; the configured default applies when absent.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Earlier turns of the conversation, oldest first.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Reachability snapshot for the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// `ok` when the index answered, `degraded` otherwise.
    pub status: &'static str,
    /// Indicates whether a stats request to the index succeeded.
    pub vector_store_reachable: bool,
}
