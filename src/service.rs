//! The StudyMate application service.
//!
//! [`StudyMate`] is built once at start-up from a [`Config`]: it opens the
//! database, runs migrations, loads the embedding model, and wires the
//! retrieval pipeline to the SQLite index. The CLI and the HTTP server
//! both drive the same instance.
//!
//! # Upload flow
//!
//! 1. Check the file extension (`.pdf`, `.txt`) and size.
//! 2. Stage the bytes at `storage.upload_dir/<document_id>.<ext>.partial`.
//! 3. Run ingestion. On failure remove the staged file, and for a new
//!    document any partially written vectors, then return the error.
//! 4. Only after ingestion succeeds, record the document's metadata.
//! 5. Move the staged file into place and remove a previous version stored
//!    under another extension.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use studymate_core::embedding::Embedder;
use studymate_core::generation::AnswerGenerator;
use studymate_core::models::{Answer, DocumentPayload};
use studymate_core::{RagError, RagPipeline};

use crate::chat::{ChatEntry, ChatHistory};
use crate::config::Config;
use crate::documents::{DocumentRecord, DocumentStore};
use crate::embedding::create_embedder;
use crate::extract::{content_type_for, extension_for, FileExtractor, SUPPORTED_EXTENSIONS};
use crate::generation::create_generator;
use crate::sqlite_index::SqliteIndex;
use crate::{db, migrate};

/// Failures surfaced by [`StudyMate`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unsupported file type '{0}': upload a .pdf or .txt file")]
    UnsupportedFile(String),

    #[error("file is larger than the {limit_mb} MB upload limit")]
    TooLarge { limit_mb: usize },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("document id already in use: {0}")]
    DocumentIdInUse(String),

    #[error("invalid document id '{0}': use only letters, digits, '-' and '_'")]
    InvalidDocumentId(String),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

pub struct StudyMate {
    config: Config,
    pool: SqlitePool,
    pipeline: RagPipeline,
    documents: DocumentStore,
    chat: ChatHistory,
}

impl StudyMate {
    /// Initialise every component from configuration.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)
            .await
            .context("Failed to initialise embedding provider")?;
        let generator =
            create_generator(&config.generation).context("Failed to initialise answer generator")?;
        Self::with_components(config, embedder, generator).await
    }

    /// Initialise with caller-supplied model components.
    pub async fn with_components(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;

        let pipeline = RagPipeline::new(
            Arc::new(FileExtractor),
            embedder.clone(),
            Arc::new(SqliteIndex::new(pool.clone())),
            generator.clone(),
            config.pipeline_settings()?,
        );

        info!(
            db = %config.db.path.display(),
            embedding_model = embedder.model_name(),
            dims = embedder.dims(),
            generation_model = generator.model_name(),
            "studymate initialised"
        );

        Ok(Self {
            documents: DocumentStore::new(pool.clone()),
            chat: ChatHistory::new(pool.clone()),
            config,
            pool,
            pipeline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Store, index, and record an uploaded file under a fresh id.
    pub async fn upload(
        &self,
        user_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ServiceResult<DocumentRecord> {
        let document_id = uuid::Uuid::new_v4().to_string();
        self.upload_as(user_id, &document_id, filename, bytes).await
    }

    /// Store, index, and record an uploaded file under `document_id`.
    ///
    /// Re-using one of the user's own ids re-ingests that document. The
    /// earlier stored file is replaced only once the new version is indexed
    /// and recorded.
    pub async fn upload_as(
        &self,
        user_id: &str,
        document_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ServiceResult<DocumentRecord> {
        if !is_valid_document_id(document_id) {
            return Err(ServiceError::InvalidDocumentId(document_id.to_string()));
        }
        let content_type = content_type_for(filename)
            .ok_or_else(|| ServiceError::UnsupportedFile(filename.to_string()))?;
        let limit_mb = self.config.storage.max_upload_mb;
        if bytes.len() > limit_mb * 1024 * 1024 {
            return Err(ServiceError::TooLarge { limit_mb });
        }
        let previous = match self.documents.owner_of(document_id).await? {
            Some(owner) if owner != user_id => {
                return Err(ServiceError::DocumentIdInUse(document_id.to_string()))
            }
            Some(_) => self.documents.get_for_user(user_id, document_id).await?,
            None => None,
        };
        let is_new = previous.is_none();

        let path = self.stored_path(document_id, content_type);
        let staged = staging_path(&path);
        self.store_file(&staged, &bytes).await?;

        let payload = DocumentPayload::new(bytes, content_type);
        let chunk_count = match self
            .pipeline
            .process_document(&payload, user_id, document_id)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(document_id, user_id, error = %e, "ingestion failed");
                self.abandon(user_id, document_id, &staged, is_new).await;
                return Err(e.into());
            }
        };
        if chunk_count == 0 {
            warn!(document_id, filename, "document contains no extractable text");
        }

        let record = DocumentRecord {
            id: document_id.to_string(),
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            upload_date: chrono::Utc::now().timestamp(),
            chunk_count: chunk_count as i64,
            storage_location: path.display().to_string(),
        };
        if let Err(e) = self.documents.upsert(&record).await {
            self.abandon(user_id, document_id, &staged, is_new).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&staged, &path).await {
            remove_file_if_present(&staged).await;
            let e = anyhow::Error::new(e)
                .context(format!("Failed to move upload into {}", path.display()));
            return Err(e.into());
        }
        if let Some(old) = previous.filter(|p| Path::new(&p.storage_location) != path.as_path()) {
            remove_file_if_present(Path::new(&old.storage_location)).await;
        }

        info!(document_id, user_id, filename, chunk_count, "document uploaded");
        Ok(record)
    }

    /// Answer a question and append it to the user's chat history.
    pub async fn ask(
        &self,
        user_id: &str,
        question: &str,
        document_ids: &[String],
        top_k: Option<usize>,
    ) -> ServiceResult<Answer> {
        let answer = self
            .pipeline
            .answer_question(user_id, question, document_ids, top_k)
            .await?;

        // History is best-effort.
        if let Err(e) = self
            .chat
            .record(user_id, question, &answer.answer, &answer.sources, document_ids)
            .await
        {
            warn!(user_id, error = %e, "failed to record chat history");
        }
        Ok(answer)
    }

    pub async fn list_documents(&self, user_id: &str) -> ServiceResult<Vec<DocumentRecord>> {
        Ok(self.documents.list_for_user(user_id).await?)
    }

    /// Delete a document the user owns: stored file, vectors, metadata.
    pub async fn delete_document(&self, user_id: &str, document_id: &str) -> ServiceResult<()> {
        let record = self
            .documents
            .get_for_user(user_id, document_id)
            .await?
            .ok_or_else(|| ServiceError::DocumentNotFound(document_id.to_string()))?;

        remove_file_if_present(Path::new(&record.storage_location)).await;
        let removed = self.pipeline.delete_document(user_id, document_id).await?;
        self.documents.delete(document_id).await?;

        info!(document_id, user_id, vectors_removed = removed, "document deleted");
        Ok(())
    }

    pub async fn history(&self, user_id: &str, limit: i64) -> ServiceResult<Vec<ChatEntry>> {
        Ok(self.chat.history(user_id, limit).await?)
    }

    /// Close the database pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn stored_path(&self, document_id: &str, content_type: &str) -> PathBuf {
        let ext = extension_for(content_type).unwrap_or(SUPPORTED_EXTENSIONS[0].0);
        self.config
            .storage
            .upload_dir
            .join(format!("{}.{}", document_id, ext))
    }

    async fn store_file(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to store upload at {}", path.display()))
    }

    /// Best-effort cleanup after a failed upload. Vectors are removed only
    /// for a document that had no earlier version.
    async fn abandon(&self, user_id: &str, document_id: &str, staged: &Path, is_new: bool) {
        remove_file_if_present(staged).await;
        if !is_new {
            return;
        }
        if let Err(e) = self.pipeline.delete_document(user_id, document_id).await {
            warn!(document_id, error = %e, "failed to remove partial index entries");
        }
    }
}

/// Document ids become file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn is_valid_document_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Where an upload is written before it replaces the stored file.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

async fn remove_file_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stored file"),
    }
}
