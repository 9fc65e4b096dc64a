//! Request-scoped storage for uploaded PDFs.
//!
//! Multipart `files` parts are streamed chunk by chunk into [`tempfile::NamedTempFile`]s inside
//! the upload directory. Each file is deleted when its [`StoredUpload`] is dropped, so nothing
//! outlives the request that created it. [`UploadStore::sweep_stale`] clears leftovers from a
//! process that died mid-request.

use crate::processing::{UploadedFile, namespace::now_millis};
use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// Multipart field carrying PDFs.
pub const FILES_FIELD: &str = "files";
/// Only MIME type accepted for uploads.
pub const PDF_MIME: &str = "application/pdf";

const MAX_STORED_NAME_LEN: usize = 100;

/// Errors raised while receiving an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A `files` part declared a MIME type other than `application/pdf`.
    #[error("'{file_name}' has unsupported content type '{content_type}'")]
    UnsupportedType {
        /// Browser-supplied file name.
        file_name: String,
        /// Declared MIME type, empty when absent.
        content_type: String,
    },
    /// Multipart body was malformed or exceeded the size limit.
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    /// Temporary file could not be created or written.
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Uploaded PDF parked on disk; the file is removed when this value is dropped.
#[derive(Debug)]
pub struct StoredUpload {
    file: UploadedFile,
    _temp: NamedTempFile,
}

impl StoredUpload {
    /// Metadata and location of the stored file.
    pub fn file(&self) -> &UploadedFile {
        &self.file
    }
}

/// Directory that holds in-flight uploads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Use `dir` for uploads, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory uploads are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stream every `files` part of `multipart` to disk.
    ///
    /// Parts under other names are skipped. The first part with a non-PDF MIME type aborts the
    /// request, and files already stored are removed as the partial result is dropped.
    pub async fn receive_pdf_files(
        &self,
        multipart: &mut Multipart,
    ) -> Result<Vec<StoredUpload>, UploadError> {
        let mut stored = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(FILES_FIELD) {
                tracing::debug!(field = ?field.name(), "Ignoring multipart field");
                continue;
            }

            let original_name = original_file_name(field.file_name());
            let content_type = field.content_type().unwrap_or_default().to_string();
            if !content_type.eq_ignore_ascii_case(PDF_MIME) {
                return Err(UploadError::UnsupportedType {
                    file_name: original_name,
                    content_type,
                });
            }

            let upload = self.persist(field, original_name, content_type).await?;
            stored.push(upload);
        }

        Ok(stored)
    }

    async fn persist(
        &self,
        mut field: Field<'_>,
        original_name: String,
        content_type: String,
    ) -> Result<StoredUpload, UploadError> {
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}-", now_millis()))
            .suffix(&format!("-{}", sanitize_file_name(&original_name)))
            .tempfile_in(&self.dir)?;

        let mut writer = tokio::fs::File::from_std(temp.reopen()?);
        let mut bytes = 0usize;
        while let Some(chunk) = field.chunk().await? {
            bytes += chunk.len();
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;

        tracing::debug!(
            file = %original_name,
            path = %temp.path().display(),
            bytes,
            "Stored upload"
        );

        Ok(StoredUpload {
            file: UploadedFile {
                original_name,
                path: temp.path().to_path_buf(),
                content_type,
            },
            _temp: temp,
        })
    }

    /// Remove files in the upload directory last modified more than `max_age` ago.
    ///
    /// Returns how many files were deleted; failures are logged and skipped.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            let age = entry
                .metadata()
                .ok()
                .and_then(|metadata| metadata.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_none_or(|age| age < max_age) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(error) => tracing::warn!(
                    path = %entry.path().display(),
                    error = %error,
                    "Failed to remove stale upload"
                ),
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.dir.display(), "Removed stale uploads");
        }
        removed
    }
}

/// Browser-supplied name without any directory components.
fn original_file_name(raw: Option<&str>) -> String {
    raw.and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("upload.pdf")
        .to_string()
}

/// Restrict a file name to `[A-Za-z0-9._-]`, replacing everything else with `_`.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STORED_NAME_LEN)
        .collect();
    if sanitized.trim_matches('.').is_empty() {
        "upload.pdf".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::{Body, to_bytes},
        extract::State,
        http::{Request, StatusCode},
        routing::post,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docura-test-boundary";

    fn multipart_body(parts: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, file_name, content_type, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                     filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Route that stores the upload and reports what it saw before the files are dropped.
    async fn receive(
        State(store): State<Arc<UploadStore>>,
        mut multipart: Multipart,
    ) -> (StatusCode, String) {
        match store.receive_pdf_files(&mut multipart).await {
            Ok(stored) => {
                let summary: Vec<String> = stored
                    .iter()
                    .map(|upload| {
                        let file = upload.file();
                        let bytes = std::fs::read(&file.path).expect("stored file readable");
                        format!("{}:{}", file.original_name, bytes.len())
                    })
                    .collect();
                (StatusCode::OK, summary.join(","))
            }
            Err(UploadError::UnsupportedType { file_name, .. }) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, file_name)
            }
            Err(error) => (StatusCode::BAD_REQUEST, error.to_string()),
        }
    }

    async fn post_upload(store: Arc<UploadStore>, body: Vec<u8>) -> (StatusCode, String) {
        let app = Router::new()
            .route("/upload", post(receive))
            .with_state(store);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).expect("read dir").next().is_none()
    }

    #[tokio::test]
    async fn stores_pdf_parts_and_removes_them_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(UploadStore::new(dir.path()).expect("store"));
        let body = multipart_body(&[
            ("files", "a.pdf", PDF_MIME, b"%PDF-1.5 first"),
            ("comment", "note.txt", "text/plain", b"ignored"),
            ("files", "b.pdf", PDF_MIME, b"%PDF-1.5 second!"),
        ]);

        let (status, summary) = post_upload(store, body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary, "a.pdf:14,b.pdf:16");
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn non_pdf_part_is_rejected_and_nothing_is_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(UploadStore::new(dir.path()).expect("store"));
        let body = multipart_body(&[
            ("files", "a.pdf", PDF_MIME, b"%PDF-1.5 first"),
            ("files", "evil.exe", "application/octet-stream", b"MZ"),
        ]);

        let (status, file_name) = post_upload(store, body).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(file_name, "evil.exe");
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn body_without_files_yields_empty_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(UploadStore::new(dir.path()).expect("store"));

        let (status, summary) = post_upload(store, multipart_body(&[])).await;

        assert_eq!(status, StatusCode::OK);
        assert!(summary.is_empty());
    }

    #[test]
    fn sweep_removes_only_old_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UploadStore::new(dir.path()).expect("store");
        std::fs::write(dir.path().join("leftover.pdf"), b"old").expect("write");

        assert_eq!(store.sweep_stale(Duration::from_secs(3600)), 0);
        assert_eq!(store.sweep_stale(Duration::ZERO), 1);
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("Q3 report (final).pdf"), "Q3_report__final_.pdf");
        assert_eq!(sanitize_file_name("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(sanitize_file_name(".."), "upload.pdf");
        assert_eq!(sanitize_file_name(&"a".repeat(300)).len(), MAX_STORED_NAME_LEN);
    }

    #[test]
    fn directory_components_are_stripped_from_names() {
        assert_eq!(original_file_name(Some("C:\\docs\\q3.pdf")), "q3.pdf");
        assert_eq!(original_file_name(Some("../../etc/q3.pdf")), "q3.pdf");
        assert_eq!(original_file_name(Some("  ")), "upload.pdf");
        assert_eq!(original_file_name(None), "upload.pdf");
    }
}
