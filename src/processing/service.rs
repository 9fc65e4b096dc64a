//! RAG service coordinating extraction, chunking, embedding, Pinecone, and the chat model.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, GeminiEmbeddingClient},
    llm::{ChatModel, GeminiChatModel},
    metrics::{MetricsSnapshot, RagMetrics},
    pinecone::{PineconeError, PineconeService, VectorStore},
    processing::{
        chunking::{ChunkingSettings, TextSplitter},
        loader::{PageText, load_pdf},
        mappers::{build_records, context_passages, current_timestamp_rfc3339, prepare_chunks},
        namespace::{NamespaceGenerator, expired_namespaces, now_millis},
        prompts::{answer_prompt, combine_documents, condense_prompt},
        types::{
            HealthSnapshot, IngestError, IngestOutcome, InitError, QueryError, QueryRequest,
            UploadedFile,
        },
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Tunables the pipelines read on every request.
#[derive(Debug, Clone)]
pub struct RagSettings {
    /// Chunk geometry for ingestion.
    pub chunking: ChunkingSettings,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Namespace queried when a request does not name one.
    pub default_namespace: String,
    /// Age in days after which upload namespaces are swept; `0` disables expiry.
    pub vector_expiration_days: u32,
}

impl RagSettings {
    /// Extract the pipeline settings from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: ChunkingSettings {
                chunk_size: config.text_splitter_chunk_size,
                overlap: config.text_splitter_chunk_overlap,
                unit: config.text_splitter_unit,
            },
            top_k: config.retrieval_top_k,
            default_namespace: config.pinecone_namespace.clone(),
            vector_expiration_days: config.vector_expiration_days,
        }
    }
}

/// Coordinates ingestion (extract, chunk, embed, upsert) and question answering
/// (condense, embed, retrieve, answer).
///
/// The service owns long-lived handles to the providers and the vector index so every request
/// reuses the same clients. Construct it once near process start and share it through an `Arc`.
pub struct RagService {
    embedder: Arc<dyn EmbeddingClient>,
    chat: Arc<dyn ChatModel>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    settings: RagSettings,
    namespaces: NamespaceGenerator,
    metrics: RagMetrics,
}

/// Abstraction over the pipelines used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, chunk, embed, and index a batch of uploaded PDFs under a fresh namespace.
    async fn ingest(&self, files: &[UploadedFile]) -> Result<IngestOutcome, IngestError>;

    /// Answer a question from the chunks stored in a namespace.
    async fn answer(&self, request: QueryRequest) -> Result<String, QueryError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Probe the vector index.
    async fn health(&self) -> HealthSnapshot;
}

impl RagService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        chat: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
        settings: RagSettings,
    ) -> Result<Self, InitError> {
        let splitter = TextSplitter::new(settings.chunking)?;
        Ok(Self {
            embedder,
            chat,
            store,
            splitter,
            settings,
            namespaces: NamespaceGenerator::new(),
            metrics: RagMetrics::new(),
        })
    }

    /// Build the production service: Gemini clients and a Pinecone handle whose index host is
    /// resolved before the first request.
    pub async fn from_config(config: &Config) -> Result<Self, InitError> {
        tracing::info!("Initializing Gemini clients");
        let embedder = Arc::new(GeminiEmbeddingClient::from_config(config)?);
        let chat = Arc::new(GeminiChatModel::from_config(config)?);

        let pinecone = PineconeService::new(config)?;
        let host = pinecone.index_host().await?;
        tracing::info!(index = %config.pinecone_index_name, host, "Pinecone index ready");

        Self::new(
            embedder,
            chat,
            Arc::new(pinecone),
            RagSettings::from_config(config),
        )
    }

    /// Settings the service was built with.
    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Extract, chunk, embed, and index a batch of uploaded PDFs.
    ///
    /// Nothing is written to the index unless at least one chunk survives extraction. A failure
    /// after the upsert has started leaves any vectors already written in place.
    pub async fn ingest(&self, files: &[UploadedFile]) -> Result<IngestOutcome, IngestError> {
        if files.is_empty() {
            return Err(IngestError::NoFiles);
        }
        tracing::info!(files = files.len(), "Processing upload");

        let mut pages: Vec<PageText> = Vec::new();
        for file in files {
            let loaded = load_pdf(&file.path, &file.original_name)
                .await
                .map_err(|source| IngestError::Load {
                    file_name: file.original_name.clone(),
                    source,
                })?;
            tracing::debug!(
                file = %file.original_name,
                pages = loaded.len(),
                "Extracted PDF text"
            );
            pages.extend(loaded);
        }

        let (chunks, skipped_duplicates) = prepare_chunks(&pages, &self.splitter);
        if chunks.is_empty() {
            return Err(IngestError::NoExtractableText);
        }
        tracing::debug!(
            chunks = chunks.len(),
            skipped_duplicates,
            chunk_size = self.settings.chunking.chunk_size,
            overlap = self.settings.chunking.overlap,
            unit = ?self.settings.chunking.unit,
            "Chunked upload"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IngestError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }

        let namespace = self.namespaces.next();
        let records = build_records(chunks, vectors, &current_timestamp_rfc3339());
        let chunks_indexed = self.store.upsert(&namespace, records).await?;

        self.metrics
            .record_upload(files.len() as u64, chunks_indexed as u64);
        tracing::info!(
            namespace = %namespace,
            documents = files.len(),
            pages = pages.len(),
            chunks = chunks_indexed,
            skipped_duplicates,
            "Upload indexed"
        );

        Ok(IngestOutcome {
            namespace,
            documents: files.len(),
            pages: pages.len(),
            chunks_indexed,
            skipped_duplicates,
        })
    }

    /// Answer a question from a namespace, condensing it against history first when there is
    /// any.
    pub async fn answer(&self, request: QueryRequest) -> Result<String, QueryError> {
        let QueryRequest {
            question,
            namespace,
            history,
        } = request;

        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let namespace = namespace
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.settings.default_namespace.clone());

        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let condensed = self
                .chat
                .generate(condense_prompt(&history, question))
                .await?;
            let condensed = condensed.trim();
            if condensed.is_empty() {
                question.to_string()
            } else {
                condensed.to_string()
            }
        };
        tracing::debug!(
            namespace = %namespace,
            history = history.len(),
            standalone = %standalone,
            "Answering question"
        );

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![standalone.clone()])
            .await?;
        let vector = vectors.pop().ok_or(QueryError::EmptyEmbedding)?;

        let hits = self
            .store
            .query(&namespace, vector, self.settings.top_k)
            .await?;
        let retrieved = hits.len();
        let context = combine_documents(&context_passages(hits));

        let answer = self
            .chat
            .generate(answer_prompt(&context, &history, &standalone))
            .await?;

        self.metrics.record_answer();
        tracing::info!(namespace = %namespace, retrieved, "Question answered");
        Ok(answer.trim().to_string())
    }

    /// Delete upload namespaces older than the configured age, returning the names selected.
    ///
    /// With `dry_run` the selection is reported without deleting anything.
    pub async fn expire_namespaces(&self, dry_run: bool) -> Result<Vec<String>, PineconeError> {
        let days = self.settings.vector_expiration_days;
        if days == 0 {
            tracing::debug!("Namespace expiry disabled");
            return Ok(Vec::new());
        }

        let names = self.store.list_namespaces().await?;
        let expired = expired_namespaces(&names, now_millis(), days);
        if dry_run {
            tracing::info!(count = expired.len(), "Namespaces eligible for expiry (dry run)");
            return Ok(expired);
        }

        for namespace in &expired {
            self.store.delete_namespace(namespace).await?;
            self.metrics.record_expired(1);
            tracing::info!(namespace = %namespace, "Expired namespace deleted");
        }
        Ok(expired)
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Probe the vector index with a stats request.
    pub async fn health(&self) -> HealthSnapshot {
        match self.store.list_namespaces().await {
            Ok(_) => HealthSnapshot {
                status: "ok",
                vector_store_reachable: true,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Vector store health probe failed");
                HealthSnapshot {
                    status: "degraded",
                    vector_store_reachable: false,
                }
            }
        }
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, files: &[UploadedFile]) -> Result<IngestOutcome, IngestError> {
        RagService::ingest(self, files).await
    }

    async fn answer(&self, request: QueryRequest) -> Result<String, QueryError> {
        RagService::answer(self, request).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }

    async fn health(&self) -> HealthSnapshot {
        RagService::health(self).await
    }
}
