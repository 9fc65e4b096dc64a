//! PDF text extraction.
//!
//! Pages are read individually through `lopdf` so chunks can carry page numbers. Documents that
//! `lopdf` cannot parse, or that yield no text page by page, are retried with `pdf-extract` and
//! treated as a single page.

use lopdf::Document;
use std::path::Path;

use super::types::LoaderError;

/// Text of one PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Original file name of the PDF.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Extracted text.
    pub text: String,
}

/// Read `path` and extract its pages on the blocking pool.
///
/// Pages without text are omitted; an image-only document yields an empty vector.
pub async fn load_pdf(path: &Path, source: &str) -> Result<Vec<PageText>, LoaderError> {
    let bytes = tokio::fs::read(path).await?;
    let source = source.to_string();
    tokio::task::spawn_blocking(move || extract_pages(&bytes, &source)).await?
}

/// Extract page texts from an in-memory PDF.
pub fn extract_pages(bytes: &[u8], source: &str) -> Result<Vec<PageText>, LoaderError> {
    let per_page_error = match extract_with_lopdf(bytes, source) {
        Ok(pages) if !pages.is_empty() => return Ok(pages),
        Ok(_) => None,
        Err(error) => Some(error),
    };

    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => {
            let text = clean_text(&text);
            tracing::debug!(
                source,
                chars = text.len(),
                "Used whole-document extraction fallback"
            );
            if text.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![PageText {
                    source: source.to_string(),
                    page: 1,
                    text,
                }])
            }
        }
        Err(fallback_error) => match per_page_error {
            Some(error) => Err(LoaderError::Unreadable(format!(
                "{error}; fallback extractor: {fallback_error}"
            ))),
            None => {
                tracing::warn!(source, error = %fallback_error, "Fallback extraction failed");
                Ok(Vec::new())
            }
        },
    }
}

fn extract_with_lopdf(bytes: &[u8], source: &str) -> Result<Vec<PageText>, lopdf::Error> {
    let document = Document::load_mem(bytes)?;
    let mut pages = Vec::new();

    for page_number in document.get_pages().into_keys() {
        match document.extract_text(&[page_number]) {
            Ok(raw) => {
                let text = clean_text(&raw);
                if !text.is_empty() {
                    pages.push(PageText {
                        source: source.to_string(),
                        page: page_number,
                        text,
                    });
                }
            }
            Err(error) => {
                tracing::debug!(
                    source,
                    page = page_number,
                    error = %error,
                    "Skipping unreadable page"
                );
            }
        }
    }

    Ok(pages)
}

/// Strip NULs and blank lines left behind by extractors.
fn clean_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
