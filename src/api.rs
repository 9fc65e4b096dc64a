//! HTTP surface for Docura.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /api/upload` – Multipart `files` field with one or more PDFs. The files are extracted,
//!   chunked, embedded, and indexed under a fresh namespace which is returned to the caller
//!   together with the number of chunks written.
//! - `POST /api/query` – `{ question, namespace?, history? }`; answers from the namespace and
//!   returns the answer as a JSON string.
//! - `GET /api/metrics` – Upload, chunk, question, and expiry counters.
//! - `GET /api/health` – Whether the vector index answers.
//! - `GET /` – The chat page.
//!
//! Failures are reported as `{ "error": message }`. Caller mistakes get a 4xx with a specific
//! message; extraction, provider, and index failures get a 500 with a fixed message while the
//! underlying error is logged.

use crate::config::Config;
use crate::processing::{
    ChatTurn, ErrorKind, IngestError, QueryError, QueryRequest, RagApi, UploadedFile,
};
use crate::uploads::{UploadError, UploadStore};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Transport-level settings applied to the router.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Request body limit, in bytes.
    pub max_upload_bytes: usize,
    /// Browser origin allowed to call the API; same-origin only when unset.
    pub cors_allowed_origin: Option<String>,
}

impl HttpSettings {
    /// Extract HTTP settings from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            cors_allowed_origin: config.cors_allowed_origin.clone(),
        }
    }
}

/// Shared handler state.
pub struct AppState<S> {
    service: Arc<S>,
    uploads: Arc<UploadStore>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            uploads: Arc::clone(&self.uploads),
        }
    }
}

/// Build the HTTP router exposing the upload, query, and diagnostics endpoints.
pub fn create_router<S>(
    service: Arc<S>,
    uploads: Arc<UploadStore>,
    settings: &HttpSettings,
) -> Router
where
    S: RagApi + 'static,
{
    let router = Router::new()
        .route("/", get(index_page))
        .route("/api/upload", post(upload_pdfs::<S>))
        .route("/api/query", post(answer_question::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .route("/api/health", get(get_health::<S>))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .with_state(AppState { service, uploads })
        .layer(TraceLayer::new_for_http());

    match cors_layer(settings.cors_allowed_origin.as_deref()) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin?;
    match origin.parse::<HeaderValue>() {
        Ok(value) => Some(
            CorsLayer::new()
                .allow_origin(value)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        ),
        Err(error) => {
            tracing::warn!(origin, error = %error, "Ignoring invalid CORS origin");
            None
        }
    }
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Success response for `POST /api/upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    namespace: String,
    chunks_indexed: usize,
}

/// Store the uploaded PDFs for the duration of the request and ingest them.
async fn upload_pdfs<S>(
    State(state): State<AppState<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError>
where
    S: RagApi,
{
    let stored = state.uploads.receive_pdf_files(&mut multipart).await?;
    if stored.is_empty() {
        return Err(IngestError::NoFiles.into());
    }

    let files: Vec<UploadedFile> = stored.iter().map(|upload| upload.file().clone()).collect();
    let outcome = state.service.ingest(&files).await?;
    drop(stored);

    tracing::info!(
        namespace = %outcome.namespace,
        documents = outcome.documents,
        chunks = outcome.chunks_indexed,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        message: "PDFs ingested successfully",
        namespace: outcome.namespace,
        chunks_indexed: outcome.chunks_indexed,
    }))
}

/// Request body for `POST /api/query`.
#[derive(Deserialize)]
struct QueryBody {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

/// Answer a question against a namespace; the body is the answer as a JSON string.
async fn answer_question<S>(
    State(state): State<AppState<S>>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<String>, ApiError>
where
    S: RagApi,
{
    let Json(body) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected query body");
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid JSON body")
    })?;

    let answer = state
        .service
        .answer(QueryRequest {
            question: body.question.unwrap_or_default(),
            namespace: body.namespace,
            history: body.history,
        })
        .await?;
    Ok(Json(answer))
}

async fn get_metrics<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
    S: RagApi,
{
    Json(state.service.metrics_snapshot())
}

async fn get_health<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
    S: RagApi,
{
    Json(state.service.health().await)
}

/// Error response rendered as `{ "error": message }`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match (error.kind(), &error) {
            (ErrorKind::Validation, IngestError::NoFiles) => {
                Self::new(StatusCode::BAD_REQUEST, "No PDF files provided")
            }
            (ErrorKind::Validation, _) => Self::new(
                StatusCode::BAD_REQUEST,
                "No extractable text found in the uploaded PDFs",
            ),
            (ErrorKind::Upstream, _) => {
                tracing::error!(error = %error, "Ingestion failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to ingest the uploaded PDFs",
                )
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        match error.kind() {
            ErrorKind::Validation => Self::new(StatusCode::BAD_REQUEST, "question is required"),
            ErrorKind::Upstream => {
                tracing::error!(error = %error, "Question answering failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to answer the question",
                )
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::UnsupportedType {
                ref file_name,
                ref content_type,
            } => {
                tracing::info!(
                    file = %file_name,
                    content_type = %content_type,
                    "Rejected non-PDF upload"
                );
                Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Only PDF files are allowed")
            }
            UploadError::Multipart(ref inner) => {
                let status = inner.status();
                tracing::info!(error = %error, %status, "Rejected multipart body");
                if status == StatusCode::PAYLOAD_TOO_LARGE {
                    Self::new(status, "Upload exceeds the size limit")
                } else {
                    Self::new(StatusCode::BAD_REQUEST, "Malformed upload request")
                }
            }
            UploadError::Io(_) => {
                tracing::error!(error = %error, "Failed to store upload");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to ingest the uploaded PDFs",
                )
            }
        }
    }
}
