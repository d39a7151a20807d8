//! Text extraction seam.
//!
//! Extractors turn a [`DocumentPayload`] into plain text in document
//! order. Empty-but-valid documents yield an empty string, not an error.

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::models::{DocumentPayload, MIME_TEXT};

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, payload: &DocumentPayload) -> Result<String, ExtractionError>;
}

/// Decode a UTF-8 text payload.
pub fn decode_utf8(bytes: &[u8]) -> Result<String, ExtractionError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ExtractionError::Unreadable(format!("invalid UTF-8: {}", e)))
}

/// Handles `text/plain` only.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, payload: &DocumentPayload) -> Result<String, ExtractionError> {
        if payload.content_type != MIME_TEXT {
            return Err(ExtractionError::UnsupportedContentType(payload.content_type.clone()));
        }
        decode_utf8(&payload.bytes)
    }
}
