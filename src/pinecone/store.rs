//! Storage seam between the pipeline and the hosted index.

use async_trait::async_trait;

use super::types::{PineconeError, ScoredChunk, VectorRecord};

/// Namespaced vector index operations required by the pipeline.
///
/// [`super::PineconeService`] is the production implementation; tests substitute an in-memory
/// index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write records into `namespace`, returning how many vectors were stored.
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, PineconeError>;

    /// Return the `top_k` nearest chunks to `vector` within `namespace`.
    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PineconeError>;

    /// Enumerate namespaces currently holding vectors.
    async fn list_namespaces(&self) -> Result<Vec<String>, PineconeError>;

    /// Remove every vector stored in `namespace`.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), PineconeError>;
}
