//! Retrieval pipeline orchestration.
//!
//! [`RagPipeline`] is an explicitly constructed service object. It holds
//! shared handles to the extractor, embedder, vector index, answer
//! generator, and namespace resolver, and runs the two flows:
//!
//! **Ingestion**: extract → chunk → embed (one batch) → build entries with
//! deterministic ids → ensure namespace → upsert. Returns the chunk count.
//! Entries left over from a longer earlier version of the same document are
//! removed after the upsert. A document that yields no chunks returns
//! `Ok(0)`, creates nothing, and clears any earlier entries.
//! Upserts are not atomic across chunks; a failure part-way may leave some
//! entries behind.
//!
//! **Query**: resolve namespace (absent or emptied → [`RagError::NoDocuments`]) →
//! check model identity → embed question → filtered search → join context
//! → generate. Sources are de-duplicated in rank order.
//!
//! No locks are held across extraction, embedding, or generation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::chunk::{chunk_text, ChunkerConfig};
use crate::embedding::{embed_checked, embed_query, Embedder, EmbeddingModel};
use crate::error::{IndexError, RagError, Result, ValidationError};
use crate::extract::TextExtractor;
use crate::generation::{AnswerGenerator, GenerationRequest};
use crate::models::{Answer, DocumentPayload, IndexedEntry, Retrieval, SearchHit};
use crate::store::{
    check_model, DerivedNamespaces, MetadataFilter, Namespace, NamespaceResolver, VectorIndex,
};

/// Number of passages retrieved when the caller does not say.
pub const DEFAULT_TOP_K: usize = 3;

/// Separator between passages in the assembled context.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Validated pipeline tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub chunker: ChunkerConfig,
    default_top_k: usize,
}

impl PipelineSettings {
    pub fn new(
        chunker: ChunkerConfig,
        default_top_k: usize,
    ) -> std::result::Result<Self, ValidationError> {
        if default_top_k == 0 {
            return Err(ValidationError::TopK);
        }
        Ok(Self {
            chunker,
            default_top_k,
        })
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

/// The retrieval-augmented question answering pipeline.
#[derive(Clone)]
pub struct RagPipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn AnswerGenerator>,
    resolver: Arc<dyn NamespaceResolver>,
    settings: PipelineSettings,
}

impl RagPipeline {
    /// Build a pipeline using [`DerivedNamespaces`].
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            generator,
            resolver: Arc::new(DerivedNamespaces),
            settings,
        }
    }

    /// Replace the user-id → namespace mapping.
    pub fn with_resolver(mut self, resolver: Arc<dyn NamespaceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn namespace_for(&self, user_id: &str) -> Namespace {
        self.resolver.namespace_for(user_id)
    }

    /// Index a document for `user_id` under `document_id`.
    ///
    /// Returns the number of chunks indexed. Re-ingesting the same
    /// `document_id` overwrites entries with the same chunk index.
    pub async fn process_document(
        &self,
        payload: &DocumentPayload,
        user_id: &str,
        document_id: &str,
    ) -> Result<usize> {
        if document_id.trim().is_empty() {
            return Err(ValidationError::EmptyDocumentId.into());
        }

        let text = self.extractor.extract(payload).await?;
        let chunks = chunk_text(&text, &self.settings.chunker);
        let namespace = self.resolver.namespace_for(user_id);
        if chunks.is_empty() {
            // Drop whatever an earlier version of this document indexed.
            let removed = self.index.delete_document(&namespace, document_id).await?;
            info!(document_id, user_id, removed, "document produced no chunks, nothing indexed");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_checked(self.embedder.as_ref(), &texts).await?;

        let entries: Vec<IndexedEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedEntry::from_chunk(chunk, vector, document_id, user_id))
            .collect();

        let model = EmbeddingModel::of(self.embedder.as_ref());
        self.index.ensure_namespace(&namespace, user_id, &model).await?;
        self.index.upsert(&namespace, &entries).await?;
        let stale = self
            .index
            .truncate_document(&namespace, document_id, entries.len())
            .await?;

        info!(
            document_id,
            user_id,
            namespace = %namespace,
            chunks = entries.len(),
            stale,
            "document indexed"
        );
        Ok(entries.len())
    }

    /// Retrieve the top-k passages for `question`.
    ///
    /// An empty `document_ids` slice searches all of the user's documents.
    pub async fn retrieve(
        &self,
        user_id: &str,
        question: &str,
        document_ids: &[String],
        top_k: Option<usize>,
    ) -> Result<Retrieval> {
        if question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }
        let k = match top_k {
            Some(0) => return Err(ValidationError::TopK.into()),
            Some(k) => k,
            None => self.settings.default_top_k,
        };

        let namespace = self.resolver.namespace_for(user_id);
        let Some(info) = self.index.namespace_info(&namespace).await? else {
            return Err(RagError::NoDocuments {
                user_id: user_id.to_string(),
            });
        };
        check_model(&info, &EmbeddingModel::of(self.embedder.as_ref()))?;

        let query = embed_query(self.embedder.as_ref(), question).await?;
        let filter = MetadataFilter::documents(document_ids);

        let hits = match self.index.search(&namespace, &query, k, filter.as_ref()).await {
            Ok(hits) => hits,
            Err(IndexError::NamespaceNotFound(_)) => {
                return Err(RagError::NoDocuments {
                    user_id: user_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        // An unfiltered search only comes back empty once every document is deleted.
        if hits.is_empty() && filter.is_none() {
            return Err(RagError::NoDocuments {
                user_id: user_id.to_string(),
            });
        }

        debug!(user_id, namespace = %namespace, k, hits = hits.len(), "retrieved passages");
        Ok(assemble(hits))
    }

    /// Answer `question` from the user's indexed documents.
    pub async fn answer_question(
        &self,
        user_id: &str,
        question: &str,
        document_ids: &[String],
        top_k: Option<usize>,
    ) -> Result<Answer> {
        let retrieval = self.retrieve(user_id, question, document_ids, top_k).await?;
        let request = GenerationRequest::new(retrieval.context, question);
        let answer = self.generator.generate(&request).await?;

        info!(
            user_id,
            model = self.generator.model_name(),
            sources = retrieval.sources.len(),
            "question answered"
        );
        Ok(Answer {
            answer,
            sources: retrieval.sources,
        })
    }

    /// Remove a document's indexed entries. Returns how many were removed.
    pub async fn delete_document(&self, user_id: &str, document_id: &str) -> Result<usize> {
        let namespace = self.resolver.namespace_for(user_id);
        let removed = self.index.delete_document(&namespace, document_id).await?;
        info!(document_id, user_id, removed, "document vectors deleted");
        Ok(removed)
    }
}

/// Join hit texts in rank order and collect distinct sources in rank order.
fn assemble(hits: Vec<SearchHit>) -> Retrieval {
    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER);

    let mut sources: Vec<String> = Vec::new();
    for hit in &hits {
        if !sources.contains(&hit.metadata.document_id) {
            sources.push(hit.metadata.document_id.clone());
        }
    }

    Retrieval {
        hits,
        context,
        sources,
    }
}
