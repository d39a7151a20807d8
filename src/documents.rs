//! Uploaded-document metadata.
//!
//! One row per successfully indexed upload: owner, original filename,
//! upload time, chunk count, and where the stored file lives. Rows are
//! written only after ingestion succeeds.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Upper bound on documents returned by a listing.
pub const LIST_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    /// Unix seconds.
    pub upload_date: i64,
    pub chunk_count: i64,
    pub storage_location: String,
}

impl DocumentRecord {
    /// `upload_date` as RFC 3339.
    pub fn upload_date_iso(&self) -> String {
        chrono::DateTime::from_timestamp(self.upload_date, 0)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| self.upload_date.to_string())
    }
}

fn record_from_row(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        filename: row.get("filename"),
        upload_date: row.get("upload_date"),
        chunk_count: row.get("chunk_count"),
        storage_location: row.get("storage_location"),
    }
}

/// SQLite-backed document metadata store.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record, or replace the one with the same id.
    pub async fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, user_id, filename, upload_date, chunk_count, storage_location)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                filename = excluded.filename,
                upload_date = excluded.upload_date,
                chunk_count = excluded.chunk_count,
                storage_location = excluded.storage_location
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.filename)
        .bind(record.upload_date)
        .bind(record.chunk_count)
        .bind(&record.storage_location)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The user's documents, newest first, at most [`LIST_LIMIT`].
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, filename, upload_date, chunk_count, storage_location
            FROM documents
            WHERE user_id = ?
            ORDER BY upload_date DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    /// A document, only if `user_id` owns it.
    pub async fn get_for_user(&self, user_id: &str, id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, filename, upload_date, chunk_count, storage_location
            FROM documents
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    /// Owner of `id`, if the document exists.
    pub async fn owner_of(&self, id: &str) -> Result<Option<String>> {
        Ok(sqlx::query_scalar("SELECT user_id FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, DocumentStore) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("docs.sqlite")).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, DocumentStore::new(pool))
    }

    fn record(id: &str, user: &str, at: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            user_id: user.into(),
            filename: format!("{}.pdf", id),
            upload_date: at,
            chunk_count: 4,
            storage_location: format!("/uploads/{}.pdf", id),
        }
    }

    #[tokio::test]
    async fn list_is_per_user_and_newest_first() {
        let (_tmp, store) = store().await;
        store.upsert(&record("old", "alice", 100)).await.unwrap();
        store.upsert(&record("new", "alice", 200)).await.unwrap();
        store.upsert(&record("bobs", "bob", 300)).await.unwrap();

        let ids: Vec<String> = store
            .list_for_user("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn get_checks_ownership() {
        let (_tmp, store) = store().await;
        store.upsert(&record("d1", "alice", 100)).await.unwrap();
        assert!(store.get_for_user("alice", "d1").await.unwrap().is_some());
        assert!(store.get_for_user("bob", "d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_and_reports_owner() {
        let (_tmp, store) = store().await;
        store.upsert(&record("d1", "alice", 100)).await.unwrap();
        let mut again = record("d1", "alice", 200);
        again.chunk_count = 7;
        store.upsert(&again).await.unwrap();

        let listed = store.list_for_user("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].chunk_count, 7);
        assert_eq!(store.owner_of("d1").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(store.owner_of("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let (_tmp, store) = store().await;
        store.upsert(&record("d1", "alice", 100)).await.unwrap();
        assert!(store.delete("d1").await.unwrap());
        assert!(!store.delete("d1").await.unwrap());
        assert!(store.list_for_user("alice").await.unwrap().is_empty());
    }

    #[test]
    fn upload_date_formats_as_iso() {
        assert_eq!(record("d", "u", 0).upload_date_iso(), "1970-01-01T00:00:00Z");
    }
}
