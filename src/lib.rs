#![deny(missing_docs)]

//! Core library for Docura, a chat-over-PDF service backed by Gemini and Pinecone.

/// HTTP routing, handlers, and the chat page.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and the Gemini adapter.
pub mod embedding;
/// Chat model abstraction and the Gemini adapter.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Pinecone vector index integration.
pub mod pinecone;
/// Ingestion and question-answering pipelines.
pub mod processing;
/// Request-scoped storage for uploaded PDFs.
pub mod uploads;
