//! # StudyMate
//!
//! Question answering over a user's own study material.
//!
//! Users upload PDFs or text notes; StudyMate extracts and chunks the text,
//! embeds each chunk into the user's private namespace, and answers
//! questions by retrieving the closest passages and handing them to a
//! chat-completions model. The retrieval pipeline itself lives in the
//! `studymate-core` crate; this crate supplies the concrete pieces
//! (SQLite index, PDF extraction, embedding and LLM providers) plus the
//! CLI and HTTP surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CLI/HTTP │──▶│  StudyMate   │──▶│ RagPipeline  │
//! └──────────┘   │ files, meta, │   │ extract,     │
//!                │ chat history │   │ chunk, embed │
//!                └──────┬───────┘   └──────┬───────┘
//!                       ▼                  ▼
//!                  ┌──────────────────────────┐
//!                  │  SQLite (WAL)            │
//!                  │  documents, chat_history │
//!                  │  namespaces, entries     │
//!                  └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_index`] | Per-user vector namespaces in SQLite |
//! | [`embedding`] | Embedding providers (local, OpenAI, Ollama, hash) |
//! | [`generation`] | Chat-completions answer generation |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`documents`] | Uploaded-document metadata |
//! | [`chat`] | Chat history |
//! | [`service`] | Upload/ask/delete orchestration |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod migrate;
pub mod server;
pub mod service;
pub mod sqlite_index;
