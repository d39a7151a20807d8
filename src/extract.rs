//! Text extraction for uploaded documents (PDF and plain text).
//!
//! Callers supply bytes plus a content-type; this module returns plain
//! UTF-8 text in document order. PDF parsing is CPU-bound and runs on a
//! blocking thread. A parser panic on a malformed file is reported as an
//! unreadable document, never propagated.

use std::path::Path;

use async_trait::async_trait;

use studymate_core::error::ExtractionError;
use studymate_core::extract::{decode_utf8, TextExtractor};
use studymate_core::models::{DocumentPayload, MIME_PDF, MIME_TEXT};

/// File extensions accepted for upload, with their content-types.
pub const SUPPORTED_EXTENSIONS: [(&str, &str); 2] = [("pdf", MIME_PDF), ("txt", MIME_TEXT)];

/// Content-type for a file name, by extension (case-insensitive).
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}

/// Canonical extension for a supported content-type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(_, ct)| *ct == content_type)
        .map(|(e, _)| *e)
}

/// Extracts text from PDF and plain-text payloads.
#[derive(Debug, Clone, Default)]
pub struct FileExtractor;

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, payload: &DocumentPayload) -> Result<String, ExtractionError> {
        match payload.content_type.as_str() {
            MIME_PDF => {
                let bytes = payload.bytes.clone();
                tokio::task::spawn_blocking(move || extract_pdf(&bytes))
                    .await
                    .map_err(|e| ExtractionError::Unreadable(format!("PDF parser crashed: {}", e)))?
            }
            MIME_TEXT => decode_utf8(&payload.bytes),
            other => Err(ExtractionError::UnsupportedContentType(other.to_string())),
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::Unreadable(format!("PDF extraction failed: {}", e)))
}
