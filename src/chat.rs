//! Chat history: every answered question, per user.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Default number of entries returned by [`ChatHistory::history`].
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    pub id: i64,
    pub user_id: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub document_ids: Vec<String>,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct ChatHistory {
    pool: SqlitePool,
}

impl ChatHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an exchange; returns the new entry id.
    pub async fn record(
        &self,
        user_id: &str,
        question: &str,
        answer: &str,
        sources: &[String],
        document_ids: &[String],
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_history
                (user_id, question, answer, sources_json, document_ids_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(question)
        .bind(answer)
        .bind(serde_json::to_string(sources)?)
        .bind(serde_json::to_string(document_ids)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// The user's most recent exchanges, newest first.
    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<ChatEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, question, answer, sources_json, document_ids_json, created_at
            FROM chat_history
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let sources: String = row.get("sources_json");
                let document_ids: String = row.get("document_ids_json");
                Ok(ChatEntry {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    question: row.get("question"),
                    answer: row.get("answer"),
                    sources: serde_json::from_str(&sources).context("corrupt sources_json")?,
                    document_ids: serde_json::from_str(&document_ids)
                        .context("corrupt document_ids_json")?,
                    timestamp: row.get("created_at"),
                })
            })
            .collect()
    }
}
