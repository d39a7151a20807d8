//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Namespaces live in the `namespaces` table and entries in
//! `index_entries`, with vectors stored as little-endian f32 BLOBs.
//! Search loads the namespace's candidate rows in insertion order and
//! ranks them by exact cosine similarity, so exact ties keep insertion
//! order.
//!
//! Concurrency is SQLite's: WAL allows readers alongside one writer, and
//! each upsert batch commits in a single transaction.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use studymate_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingModel};
use studymate_core::error::IndexError;
use studymate_core::models::{EntryMetadata, IndexedEntry, SearchHit};
use studymate_core::store::{
    check_dims, check_model, rank_hits, MetadataFilter, Namespace, NamespaceInfo, VectorIndex,
};

/// SQLite implementation of the [`VectorIndex`] trait.
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_namespace(&self, namespace: &Namespace) -> Result<NamespaceInfo, IndexError> {
        self.namespace_info(namespace)
            .await?
            .ok_or_else(|| IndexError::NamespaceNotFound(namespace.to_string()))
    }
}

fn namespace_from_row(row: &SqliteRow) -> NamespaceInfo {
    let dims: i64 = row.get("dims");
    NamespaceInfo {
        namespace: Namespace::new(row.get::<String, _>("name")),
        user_id: row.get("user_id"),
        model: EmbeddingModel::new(row.get::<String, _>("model"), dims as usize),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn namespace_info(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<NamespaceInfo>, IndexError> {
        let row = sqlx::query(
            "SELECT name, user_id, model, dims, created_at FROM namespaces WHERE name = ?",
        )
        .bind(namespace.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(IndexError::backend)?;
        Ok(row.as_ref().map(namespace_from_row))
    }

    async fn ensure_namespace(
        &self,
        namespace: &Namespace,
        user_id: &str,
        model: &EmbeddingModel,
    ) -> Result<NamespaceInfo, IndexError> {
        // A single statement: concurrent callers either create the row or
        // observe the one that won.
        sqlx::query(
            r#"
            INSERT INTO namespaces (name, user_id, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(namespace.as_str())
        .bind(user_id)
        .bind(&model.name)
        .bind(model.dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(IndexError::backend)?;

        let info = self.require_namespace(namespace).await?;
        check_model(&info, model)?;
        Ok(info)
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        entries: &[IndexedEntry],
    ) -> Result<(), IndexError> {
        let info = self.require_namespace(namespace).await?;
        check_dims(&info, entries)?;

        let mut tx = self.pool.begin().await.map_err(IndexError::backend)?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (namespace, entry_id, document_id, chunk_index,
                                           user_id, text, content_hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(namespace, entry_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    user_id = excluded.user_id,
                    text = excluded.text,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(namespace.as_str())
            .bind(&entry.id)
            .bind(&entry.metadata.document_id)
            .bind(entry.metadata.chunk_index as i64)
            .bind(&entry.metadata.user_id)
            .bind(&entry.text)
            .bind(&entry.content_hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(IndexError::backend)?;
        }
        tx.commit().await.map_err(IndexError::backend)?;
        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.require_namespace(namespace).await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT entry_id, document_id, chunk_index, user_id, text, embedding \
             FROM index_entries WHERE namespace = ",
        );
        qb.push_bind(namespace.as_str().to_string());
        if let Some(MetadataFilter::DocumentIn(ids)) = filter {
            qb.push(" AND document_id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");
        }
        qb.push(" ORDER BY seq ASC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(IndexError::backend)?;

        let hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                SearchHit {
                    entry_id: row.get("entry_id"),
                    text: row.get("text"),
                    metadata: EntryMetadata {
                        document_id: row.get("document_id"),
                        chunk_index: chunk_index as usize,
                        user_id: row.get("user_id"),
                    },
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
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
        let result = sqlx::query(
            "DELETE FROM index_entries WHERE namespace = ? AND document_id = ? AND chunk_index >= ?",
        )
        .bind(namespace.as_str())
        .bind(document_id)
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(IndexError::backend)?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, namespace: &Namespace) -> Result<usize, IndexError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE namespace = ?")
                .bind(namespace.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(IndexError::backend)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn index() -> (TempDir, SqliteIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("index.sqlite")).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, SqliteIndex::new(pool))
    }

    fn entry(doc: &str, i: usize, vector: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: studymate_core::models::entry_id(doc, i),
            vector,
            text: format!("{} chunk {}", doc, i),
            content_hash: format!("hash-{}-{}", doc, i),
            metadata: EntryMetadata {
                document_id: doc.into(),
                chunk_index: i,
                user_id: "alice".into(),
            },
        }
    }

    fn model() -> EmbeddingModel {
        EmbeddingModel::new("test-model", 2)
    }

    #[tokio::test]
    async fn ensure_namespace_is_idempotent_and_checks_model() {
        let (_tmp, idx) = index().await;
        let ns = Namespace::new("user_alice");
        assert!(idx.namespace_info(&ns).await.unwrap().is_none());

        let first = idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();
        let second = idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.model, model());

        let err = idx
            .ensure_namespace(&ns, "alice", &EmbeddingModel::new("other", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn upsert_requires_namespace_and_matching_dims() {
        let (_tmp, idx) = index().await;
        let ns = Namespace::new("user_alice");
        let err = idx.upsert(&ns, &[entry("d", 0, vec![1.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, IndexError::NamespaceNotFound(_)));

        idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();
        let err = idx.upsert(&ns, &[entry("d", 0, vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn upsert_overwrites_and_keeps_position() {
        let (_tmp, idx) = index().await;
        let ns = Namespace::new("user_alice");
        idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();

        idx.upsert(&ns, &[entry("a", 0, vec![1.0, 0.0]), entry("b", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let mut replaced = entry("a", 0, vec![2.0, 0.0]);
        replaced.text = "replaced".into();
        idx.upsert(&ns, &[replaced]).await.unwrap();

        assert_eq!(idx.count(&ns).await.unwrap(), 2);
        // Same direction, same score: insertion order decides.
        let hits = idx.search(&ns, &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].entry_id, "a_chunk_0");
        assert_eq!(hits[0].text, "replaced");
        assert_eq!(hits[1].entry_id, "b_chunk_0");
    }

    #[tokio::test]
    async fn search_ranks_filters_and_bounds() {
        let (_tmp, idx) = index().await;
        let ns = Namespace::new("user_alice");
        idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();
        idx.upsert(
            &ns,
            &[
                entry("a", 0, vec![0.0, 1.0]),
                entry("a", 1, vec![1.0, 0.0]),
                entry("b", 0, vec![0.8, 0.2]),
            ],
        )
        .await
        .unwrap();

        let hits = idx.search(&ns, &[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["a_chunk_1", "b_chunk_0"]);
        assert_eq!(hits[0].metadata.chunk_index, 1);

        assert_eq!(idx.search(&ns, &[1.0, 0.0], 50, None).await.unwrap().len(), 3);

        let filter = MetadataFilter::DocumentIn(vec!["a".into()]);
        let hits = idx.search(&ns, &[1.0, 0.0], 50, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata.document_id == "a"));

        let err = idx
            .search(&Namespace::new("user_bob"), &[1.0, 0.0], 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NamespaceNotFound(_)));
    }

    #[tokio::test]
    async fn namespaces_do_not_share_entries() {
        let (_tmp, idx) = index().await;
        let alice = Namespace::new("user_alice");
        let bob = Namespace::new("user_bob");
        idx.ensure_namespace(&alice, "alice", &model()).await.unwrap();
        idx.ensure_namespace(&bob, "bob", &model()).await.unwrap();
        idx.upsert(&alice, &[entry("a", 0, vec![1.0, 0.0])]).await.unwrap();

        assert!(idx.search(&bob, &[1.0, 0.0], 3, None).await.unwrap().is_empty());
        assert_eq!(idx.count(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_document_removes_its_entries() {
        let (_tmp, idx) = index().await;
        let ns = Namespace::new("user_alice");
        idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();
        idx.upsert(
            &ns,
            &[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![0.0, 1.0]),
                entry("b", 0, vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();

        assert_eq!(idx.delete_document(&ns, "a").await.unwrap(), 2);
        assert_eq!(idx.count(&ns).await.unwrap(), 1);
        assert_eq!(idx.delete_document(&ns, "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn truncate_document_drops_trailing_chunks_only() {
        let (_tmp, idx) = index().await;
        let ns = Namespace::new("user_alice");
        idx.ensure_namespace(&ns, "alice", &model()).await.unwrap();
        idx.upsert(
            &ns,
            &[
                entry("a", 0, vec![1.0, 0.0]),
                entry("a", 1, vec![1.0, 0.0]),
                entry("a", 2, vec![1.0, 0.0]),
                entry("b", 3, vec![1.0, 0.0]),
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
        assert_eq!(ids, vec!["a_chunk_0".to_string(), "b_chunk_3".to_string()]);
    }
}
