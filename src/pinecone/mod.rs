//! Pinecone vector index integration.

pub mod client;
pub mod store;
pub mod types;

pub use client::PineconeService;
pub use store::VectorStore;
pub use types::{ChunkMetadata, PineconeError, ScoredChunk, VectorRecord};
