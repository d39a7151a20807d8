//! # StudyMate CLI (`studymate`)
//!
//! Upload study material, ask questions about it, and run the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! studymate --config ./config/studymate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `studymate init` | Create the SQLite database and run schema migrations |
//! | `studymate ingest <file> --user <id>` | Store and index a `.pdf` or `.txt` file |
//! | `studymate ask "<question>" --user <id>` | Answer a question from the user's documents |
//! | `studymate documents list --user <id>` | List the user's documents |
//! | `studymate documents delete <id> --user <id>` | Delete a document and its vectors |
//! | `studymate history --user <id>` | Show recent questions and answers |
//! | `studymate serve` | Start the HTTP API |
//!
//! Log verbosity follows `RUST_LOG` (default `studymate=info,studymate_core=info`); logs go to
//! stderr so command output stays pipeable.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use studymate::chat::DEFAULT_HISTORY_LIMIT;
use studymate::config;
use studymate::migrate;
use studymate::server;
use studymate::service::StudyMate;

/// StudyMate: question answering over your own study material.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/studymate.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "studymate",
    about = "StudyMate: ask questions about your PDFs and notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/studymate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Store and index a document for a user.
    Ingest {
        /// Path to a `.pdf` or `.txt` file.
        path: PathBuf,

        /// Owner of the document.
        #[arg(long)]
        user: String,

        /// Re-ingest under an existing document id instead of minting one.
        #[arg(long)]
        document_id: Option<String>,
    },

    /// Ask a question about the user's documents.
    Ask {
        question: String,

        #[arg(long)]
        user: String,

        /// Restrict retrieval to these documents (repeatable).
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage uploaded documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Show the user's chat history, newest first.
    History {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: i64,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List the user's documents, newest first.
    List {
        #[arg(long)]
        user: String,
    },
    /// Delete a document, its stored file, and its vectors.
    Delete {
        id: String,

        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("studymate=info,studymate_core=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            user,
            document_id,
        } => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("Invalid file path: {}", path.display()))?
                .to_string();
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let app = StudyMate::open(cfg).await?;
            let record = match document_id {
                Some(id) => app.upload_as(&user, &id, &filename, bytes).await?,
                None => app.upload(&user, &filename, bytes).await?,
            };
            app.close().await;

            println!("Document uploaded successfully.");
            println!("  id:       {}", record.id);
            println!("  filename: {}", record.filename);
            println!("  chunks:   {}", record.chunk_count);
        }
        Commands::Ask {
            question,
            user,
            documents,
            top_k,
        } => {
            let app = StudyMate::open(cfg).await?;
            let answer = app.ask(&user, &question, &documents, top_k).await?;
            app.close().await;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources: {}", answer.sources.join(", "));
            }
        }
        Commands::Documents { action } => {
            let app = StudyMate::open(cfg).await?;
            match action {
                DocumentsAction::List { user } => {
                    let records = app.list_documents(&user).await?;
                    if records.is_empty() {
                        println!("No documents.");
                    }
                    for r in records {
                        println!(
                            "{}  {}  {} chunks  {}",
                            r.id,
                            r.upload_date_iso(),
                            r.chunk_count,
                            r.filename
                        );
                    }
                }
                DocumentsAction::Delete { id, user } => {
                    app.delete_document(&user, &id).await?;
                    println!("Document deleted successfully.");
                }
            }
            app.close().await;
        }
        Commands::History { user, limit } => {
            let app = StudyMate::open(cfg).await?;
            let entries = app.history(&user, limit).await?;
            app.close().await;

            if entries.is_empty() {
                println!("No chat history.");
            }
            for e in entries {
                println!("Q: {}", e.question);
                println!("A: {}", e.answer);
                if !e.sources.is_empty() {
                    println!("   sources: {}", e.sources.join(", "));
                }
                println!();
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
