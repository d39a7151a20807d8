//! Error taxonomy for the retrieval pipeline.
//!
//! Each pipeline stage has its own error type so callers can tell *where*
//! a request failed. [`RagError`] wraps them all and adds the distinct
//! [`RagError::NoDocuments`] condition, which the serving layer maps to a
//! "no documents for this user" response rather than a generic failure.

use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Text extraction failed: the payload is unreadable, corrupt, or of a
/// type no extractor handles.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document is unreadable: {0}")]
    Unreadable(String),

    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
}

/// The embedding model or its transport failed, or returned vectors that
/// violate the batch contract.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider failed: {0}")]
    Provider(String),

    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding has {actual} dimensions, model declares {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}

/// Vector index failures.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error(
        "namespace {namespace} was built with embedding model '{indexed}', refusing to use '{requested}'"
    )]
    ModelMismatch {
        namespace: String,
        indexed: String,
        requested: String,
    },

    #[error("vector has {actual} dimensions, namespace expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

impl IndexError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}

/// The language-model call failed. Never retried by the core.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation API returned no answer text")]
    EmptyResponse,
}

/// Invalid chunking or query parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("chunk size must be > 0")]
    ChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    Overlap { overlap: usize, chunk_size: usize },

    #[error("top_k must be a positive integer")]
    TopK,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("document id must not be empty")]
    EmptyDocumentId,
}

/// Pipeline-level error. The Display text names the failing stage and
/// carries the underlying cause.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("no documents indexed for user {user_id}")]
    NoDocuments { user_id: String },

    #[error("vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
}

impl RagError {
    /// Short machine-readable stage name, used in logs and API error codes.
    pub fn stage(&self) -> &'static str {
        match self {
            RagError::Extraction(_) => "extraction",
            RagError::Embedding(_) => "embedding",
            RagError::NoDocuments { .. } => "no_documents",
            RagError::Index(_) => "index",
            RagError::Generation(_) => "generation",
            RagError::Validation(_) => "validation",
        }
    }
}
