//! # StudyMate Core
//!
//! Runtime-agnostic core of the StudyMate retrieval pipeline.
//!
//! This crate contains no tokio, database, or filesystem I/O. Concrete
//! backends (SQLite index, PDF extraction, HTTP embedders and the
//! chat-completions generator) live in the `studymate` app crate and plug
//! in through the traits defined here.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Payloads, chunks, indexed entries, hits, answers |
//! | [`chunk`] | Recursive boundary-preferring chunker |
//! | [`embedding`] | [`Embedder`](embedding::Embedder) trait, vector maths, offline hash embedder |
//! | [`store`] | [`VectorIndex`](store::VectorIndex) trait, namespaces, in-memory index |
//! | [`extract`] | [`TextExtractor`](extract::TextExtractor) trait |
//! | [`generation`] | [`AnswerGenerator`](generation::AnswerGenerator) trait and prompt |
//! | [`pipeline`] | [`RagPipeline`](pipeline::RagPipeline) orchestration |
//! | [`error`] | Stage-specific error taxonomy |

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod store;

pub use error::{RagError, Result};
pub use pipeline::{PipelineSettings, RagPipeline};
