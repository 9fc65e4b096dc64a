//! Document pipelines: PDF extraction, chunking, embedding, Pinecone writes, and the
//! condense-then-answer chain.

pub mod chunking;
pub mod expiry;
pub mod loader;
mod mappers;
pub mod namespace;
mod prompts;
mod service;
pub mod types;

pub use expiry::spawn_expiry_task;
pub use service::{RagApi, RagService, RagSettings};
pub use types::{
    ChatRole, ChatTurn, ChunkingError, ErrorKind, HealthSnapshot, IngestError, IngestOutcome,
    InitError, LoaderError, QueryError, QueryRequest, UploadedFile,
};
