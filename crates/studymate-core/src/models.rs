//! Core data types flowing through ingestion and retrieval.

use serde::{Deserialize, Serialize};

/// MIME type of PDF payloads.
pub const MIME_PDF: &str = "application/pdf";
/// MIME type of plain UTF-8 text payloads.
pub const MIME_TEXT: &str = "text/plain";

/// Raw document bytes plus the content-type the extractor should assume.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl DocumentPayload {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn pdf(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, MIME_PDF)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), MIME_TEXT)
    }
}

/// A contiguous span of a document's extracted text.
///
/// `start` and `end` are character offsets into the source text, so
/// `text == source.chars().skip(start).take(end - start)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Metadata stored alongside every indexed vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub document_id: String,
    pub chunk_index: usize,
    pub user_id: String,
}

/// One (vector, text, metadata) triple addressed by a deterministic id.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub content_hash: String,
    pub metadata: EntryMetadata,
}

impl IndexedEntry {
    /// Build an entry for `chunk` of `document_id`, owned by `user_id`.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>, document_id: &str, user_id: &str) -> Self {
        Self {
            id: entry_id(document_id, chunk.chunk_index),
            vector,
            text: chunk.text.clone(),
            content_hash: chunk.hash.clone(),
            metadata: EntryMetadata {
                document_id: document_id.to_string(),
                chunk_index: chunk.chunk_index,
                user_id: user_id.to_string(),
            },
        }
    }
}

/// Deterministic entry id: re-ingesting a document id overwrites its
/// entries instead of duplicating them.
pub fn entry_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", document_id, chunk_index)
}

/// A search result: chunk text, its metadata, and the similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry_id: String,
    pub text: String,
    pub metadata: EntryMetadata,
    pub score: f32,
}

/// Output of the retrieval half of a query.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub hits: Vec<SearchHit>,
    /// Hit texts in rank order joined by a blank line.
    pub context: String,
    /// Distinct source document ids, in rank order of first appearance.
    pub sources: Vec<String>,
}

/// Final answer returned to the serving layer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}
