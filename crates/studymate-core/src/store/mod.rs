//! Vector index abstraction for StudyMate.
//!
//! The [`VectorIndex`] trait defines the per-namespace storage and
//! nearest-neighbour search used by the retrieval pipeline, enabling
//! pluggable backends (SQLite in the app crate, in-memory here).
//!
//! Every namespace records the [`EmbeddingModel`] its vectors were built
//! with. Backends must refuse to mix models within a namespace.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingModel;
use crate::error::IndexError;
use crate::models::{IndexedEntry, SearchHit};

/// Storage partition key scoping one user's indexed content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the index knows about a namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceInfo {
    pub namespace: Namespace,
    pub user_id: String,
    pub model: EmbeddingModel,
    /// Unix seconds.
    pub created_at: i64,
}

/// Restricts a search to entries whose metadata matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    /// `document_id ∈ set`.
    DocumentIn(Vec<String>),
}

impl MetadataFilter {
    /// Build a document filter; an empty id list means "no restriction".
    pub fn documents(ids: &[String]) -> Option<Self> {
        if ids.is_empty() {
            None
        } else {
            Some(Self::DocumentIn(ids.to_vec()))
        }
    }

    pub fn matches(&self, entry: &IndexedEntry) -> bool {
        match self {
            MetadataFilter::DocumentIn(ids) => {
                ids.iter().any(|id| *id == entry.metadata.document_id)
            }
        }
    }
}

/// Maps a resolved user id to the namespace holding that user's vectors.
pub trait NamespaceResolver: Send + Sync {
    fn namespace_for(&self, user_id: &str) -> Namespace;
}

/// Default resolver: `user_<sanitized>_<hash>`.
///
/// The sanitized part keeps the name readable; the SHA-256 prefix of the
/// raw user id keeps two ids that sanitize identically (`a.b@x` and
/// `a_b@x`) in separate namespaces.
#[derive(Debug, Clone, Default)]
pub struct DerivedNamespaces;

const READABLE_PART_MAX: usize = 32;
const HASH_PREFIX_LEN: usize = 12;

impl NamespaceResolver for DerivedNamespaces {
    fn namespace_for(&self, user_id: &str) -> Namespace {
        let readable: String = user_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .take(READABLE_PART_MAX)
            .collect();
        let digest = format!("{:x}", Sha256::digest(user_id.as_bytes()));
        Namespace(format!("user_{}_{}", readable, &digest[..HASH_PREFIX_LEN]))
    }
}

/// Per-namespace vector storage with exact nearest-neighbour search.
///
/// # Operations
///
/// | Method | Missing namespace |
/// |--------|-------------------|
/// | [`namespace_info`](VectorIndex::namespace_info) | `Ok(None)` |
/// | [`ensure_namespace`](VectorIndex::ensure_namespace) | created |
/// | [`upsert`](VectorIndex::upsert) | `NamespaceNotFound` |
/// | [`search`](VectorIndex::search) | `NamespaceNotFound` |
/// | [`delete_document`](VectorIndex::delete_document) | `Ok(0)` |
/// | [`truncate_document`](VectorIndex::truncate_document) | `Ok(0)` |
/// | [`count`](VectorIndex::count) | `Ok(0)` |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Look up a namespace without creating it.
    async fn namespace_info(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<NamespaceInfo>, IndexError>;

    /// Idempotent get-or-create. Creation is a single atomic step.
    ///
    /// Fails with [`IndexError::ModelMismatch`] when the namespace exists
    /// but was built with a different model.
    async fn ensure_namespace(
        &self,
        namespace: &Namespace,
        user_id: &str,
        model: &EmbeddingModel,
    ) -> Result<NamespaceInfo, IndexError>;

    /// Insert or overwrite entries by entry id.
    async fn upsert(
        &self,
        namespace: &Namespace,
        entries: &[IndexedEntry],
    ) -> Result<(), IndexError>;

    /// Up to `k` entries by descending cosine similarity. Exact ties keep
    /// insertion order.
    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Remove every entry of `document_id`; returns how many were removed.
    async fn delete_document(
        &self,
        namespace: &Namespace,
        document_id: &str,
    ) -> Result<usize, IndexError>;

    /// Remove entries of `document_id` with `chunk_index >= keep`; returns
    /// how many were removed.
    async fn truncate_document(
        &self,
        namespace: &Namespace,
        document_id: &str,
        keep: usize,
    ) -> Result<usize, IndexError>;

    /// Number of entries in the namespace.
    async fn count(&self, namespace: &Namespace) -> Result<usize, IndexError>;
}

/// Reject vectors whose length differs from the namespace's model.
pub fn check_dims(info: &NamespaceInfo, entries: &[IndexedEntry]) -> Result<(), IndexError> {
    match entries.iter().find(|e| e.vector.len() != info.model.dims) {
        Some(bad) => Err(IndexError::DimensionMismatch {
            expected: info.model.dims,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Reject a namespace built with a model other than `model`.
pub fn check_model(info: &NamespaceInfo, model: &EmbeddingModel) -> Result<(), IndexError> {
    if info.model != *model {
        return Err(IndexError::ModelMismatch {
            namespace: info.namespace.to_string(),
            indexed: format!("{} ({} dims)", info.model.name, info.model.dims),
            requested: format!("{} ({} dims)", model.name, model.dims),
        });
    }
    Ok(())
}

/// Sort scored hits (given in insertion order) by descending score and keep
/// the first `k`. The sort is stable, so exact ties keep insertion order.
pub fn rank_hits(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryMetadata;

    #[test]
    fn derived_namespace_is_deterministic_and_readable() {
        let r = DerivedNamespaces;
        let a = r.namespace_for("Alice@Example.com");
        assert_eq!(a, r.namespace_for("Alice@Example.com"));
        assert!(a.as_str().starts_with("user_alice_example_com_"));
    }

    #[test]
    fn derived_namespace_separates_ids_that_sanitize_alike() {
        let r = DerivedNamespaces;
        assert_ne!(r.namespace_for("a.b@x.io"), r.namespace_for("a_b@x.io"));
        assert_ne!(r.namespace_for("a.b@x.io"), r.namespace_for("a_b_x_io"));
    }

    #[test]
    fn derived_namespace_bounds_length() {
        let long = "x".repeat(500);
        let ns = DerivedNamespaces.namespace_for(&long);
        assert_eq!(ns.as_str().len(), "user_".len() + READABLE_PART_MAX + 1 + HASH_PREFIX_LEN);
    }

    #[test]
    fn empty_document_list_means_no_filter() {
        assert!(MetadataFilter::documents(&[]).is_none());
        let f = MetadataFilter::documents(&["d1".to_string()]).unwrap();
        assert_eq!(f, MetadataFilter::DocumentIn(vec!["d1".into()]));
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            entry_id: id.into(),
            text: String::new(),
            metadata: EntryMetadata {
                document_id: "d".into(),
                chunk_index: 0,
                user_id: "u".into(),
            },
            score,
        }
    }

    #[test]
    fn rank_hits_is_stable_among_ties() {
        let ranked = rank_hits(
            vec![hit("a", 0.5), hit("b", 0.9), hit("c", 0.5), hit("d", 0.5)],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|h| h.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
