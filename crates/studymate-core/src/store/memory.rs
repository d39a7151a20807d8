//! In-memory [`VectorIndex`] implementation for tests and embedding.
//!
//! Namespaces live in a `HashMap` behind a `parking_lot::RwLock`. Entries
//! keep insertion order in a `Vec`; overwriting an existing entry id keeps
//! its original position. Search is brute-force cosine similarity.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::{cosine_similarity, EmbeddingModel};
use crate::error::IndexError;
use crate::models::{IndexedEntry, SearchHit};

use super::{
    check_dims, check_model, rank_hits, MetadataFilter, Namespace, NamespaceInfo, VectorIndex,
};

struct StoredNamespace {
    info: NamespaceInfo,
    entries: Vec<IndexedEntry>,
}

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<HashMap<Namespace, StoredNamespace>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn namespace_info(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<NamespaceInfo>, IndexError> {
        Ok(self.namespaces.read().get(namespace).map(|s| s.info.clone()))
    }

    async fn ensure_namespace(
        &self,
        namespace: &Namespace,
        user_id: &str,
        model: &EmbeddingModel,
    ) -> Result<NamespaceInfo, IndexError> {
        let mut namespaces = self.namespaces.write();
        let stored = namespaces
            .entry(namespace.clone())
            .or_insert_with(|| StoredNamespace {
                info: NamespaceInfo {
                    namespace: namespace.clone(),
                    user_id: user_id.to_string(),
                    model: model.clone(),
                    created_at: chrono::Utc::now().timestamp(),
                },
                entries: Vec::new(),
            });
        check_model(&stored.info, model)?;
        Ok(stored.info.clone())
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        entries: &[IndexedEntry],
    ) -> Result<(), IndexError> {
        let mut namespaces = self.namespaces.write();
        let stored = namespaces
            .get_mut(namespace)
            .ok_or_else(|| IndexError::NamespaceNotFound(namespace.to_string()))?;
        check_dims(&stored.info, entries)?;

        for entry in entries {
            match stored.entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => stored.entries.push(entry.clone()),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let namespaces = self.namespaces.read();
        let stored = namespaces
            .get(namespace)
            .ok_or_else(|| IndexError::NamespaceNotFound(namespace.to_string()))?;

        let hits: Vec<SearchHit> = stored
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(e)))
            .map(|e| SearchHit {
                entry_id: e.id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();

        Ok(rank_hits(hits, k))
    }

    async fn delete_document(
        &self,
        namespace: &Namespace,
        document_id: &str,
    ) -> Result<usize, IndexError> {
        self.truncate_document(namespace, document_id, 0).await
    }

    async fn truncate_document(
        &self,
        namespace: &Namespace,
        document_id: &str,
        keep: usize,
    ) -> Result<usize, IndexError> {
        let mut namespaces = self.namespaces.write();
        let Some(stored) = namespaces.get_mut(namespace) else {
            return Ok(0);
        };
        let before = stored.entries.len();
        stored
            .entries
            .retain(|e| e.metadata.document_id != document_id || e.metadata.chunk_index < keep);
        Ok(before - stored.entries.len())
    }

    async fn count(&self, namespace: &Namespace) -> Result<usize, IndexError> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map_or(0, |s| s.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryMetadata;

    fn entry(doc: &str, i: usize, vector: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: crate::models::entry_id(doc, i),
            vector,
            text: format!("{} chunk {}", doc, i),
            content_hash: String::new(),
            metadata: EntryMetadata {
                document_id: doc.into(),
                chunk_index: i,
                user_id: "u".into(),
            },
        }
    }

    fn model() -> EmbeddingModel {
        EmbeddingModel::new("test", 2)
    }

    #[tokio::test]
    async fn ensure_namespace_is_idempotent() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        assert!(idx.namespace_info(&ns).await.unwrap().is_none());
        let a = idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        let b = idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        assert_eq!(a, b);
        assert!(idx.namespace_info(&ns).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ensure_namespace_rejects_other_model() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        let err = idx
            .ensure_namespace(&ns, "u", &EmbeddingModel::new("other", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        let entries = vec![entry("d", 0, vec![1.0, 0.0]), entry("d", 1, vec![0.0, 1.0])];
        idx.upsert(&ns, &entries).await.unwrap();
        idx.upsert(&ns, &entries).await.unwrap();
        assert_eq!(idx.count(&ns).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        let err = idx
            .upsert(&ns, &[entry("d", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn search_missing_namespace_fails() {
        let idx = InMemoryIndex::new();
        let err = idx
            .search(&Namespace::new("nope"), &[1.0, 0.0], 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NamespaceNotFound(_)));
    }

    #[tokio::test]
    async fn search_ranks_filters_and_bounds() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        idx.upsert(
            &ns,
            &[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![0.7, 0.7]),
                entry("b", 0, vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

        let hits = idx.search(&ns, &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry_id, "a_chunk_0");
        assert_eq!(hits[1].entry_id, "a_chunk_1");

        let all = idx.search(&ns, &[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let filter = MetadataFilter::DocumentIn(vec!["b".into()]);
        let only_b = idx.search(&ns, &[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].metadata.document_id, "b");
    }

    #[tokio::test]
    async fn delete_document_removes_only_its_entries() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        idx.upsert(
            &ns,
            &[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![1.0, 0.0]),
                entry("b", 0, vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();
        assert_eq!(idx.delete_document(&ns, "a").await.unwrap(), 2);
        assert_eq!(idx.count(&ns).await.unwrap(), 1);
        assert_eq!(idx.delete_document(&Namespace::new("nope"), "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn truncate_document_keeps_leading_chunks() {
        let idx = InMemoryIndex::new();
        let ns = Namespace::new("user_u");
        idx.ensure_namespace(&ns, "u", &model()).await.unwrap();
        idx.upsert(
            &ns,
            &[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![1.0, 0.0]),
                entry("a", 2, vec![1.0, 0.0]),
                entry("b", 5, vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();
        assert_eq!(idx.truncate_document(&ns, "a", 1).await.unwrap(), 2);
        let ids: Vec<String> = idx
            .search(&ns, &[1.0, 0.0], 10, None)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.entry_id)
            .collect();
        assert_eq!(ids, vec!["a_chunk_0".to_string(), "b_chunk_5".to_string()]);
    }
}
