//! Answer generation: the [`AnswerGenerator`] seam and prompt construction.
//!
//! The core only assembles the request. Model calls, transport, and
//! credentials belong to implementations in the app crate.

use async_trait::async_trait;

use crate::error::GenerationError;

/// System instruction restricting answers to the supplied context.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful study assistant. Answer questions based ONLY on the provided context. If the answer is not in the context, say so.";

/// Everything a generator needs for one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub context: String,
    pub question: String,
}

impl GenerationRequest {
    /// A request using [`SYSTEM_INSTRUCTION`].
    pub fn new(context: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_INSTRUCTION.to_string(),
            context: context.into(),
            question: question.into(),
        }
    }

    /// The user-turn message sent to the model.
    pub fn user_message(&self) -> String {
        format!(
            "Context from documents:\n{}\n\nQuestion: {}\n\nPlease provide a clear, accurate answer based on the context above.",
            self.context, self.question
        )
    }
}

/// Produces a natural-language answer from a question and its context.
///
/// Implementations make a single attempt; retry policy is the caller's.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Offline generator that answers with the best-ranked context passage.
///
/// Useful without network access and in tests; the pipeline places the
/// highest-scoring passage first in the context.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let passage = request
            .context
            .split("\n\n")
            .map(str::trim)
            .find(|p| !p.is_empty());
        Ok(match passage {
            Some(p) => p.to_string(),
            None => "The provided documents do not contain an answer to this question.".to_string(),
        })
    }
}
