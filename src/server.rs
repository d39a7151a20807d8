//! StudyMate HTTP API.
//!
//! A thin JSON layer over [`StudyMate`]. Authentication is handled by an
//! upstream collaborator, which forwards the resolved user id in the
//! `x-user-id` header; every route except `/` and `/health` requires it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | API info |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents/upload` | Upload a `.pdf`/`.txt` (multipart field `file`) |
//! | `GET`  | `/documents` | List the user's documents (also `/documents/list`) |
//! | `DELETE` | `/documents/{id}` | Delete a document, its file, and its vectors |
//! | `POST` | `/chat/query` | Ask a question: `{ "message", "document_ids"?, "top_k"? }` |
//! | `GET`  | `/chat/history?limit=` | Newest-first chat history (default 50) |
//!
//! # Error Contract
//!
//! All error responses share one shape, including malformed JSON bodies,
//! query strings, and multipart payloads:
//!
//! ```json
//! { "error": { "code": "no_documents", "message": "no documents indexed for user alice" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `unauthorized` | 401 |
//! | `bad_request` | 400 |
//! | `not_found`, `no_documents` | 404 |
//! | `timeout` | 408 |
//! | `conflict` | 409 |
//! | `payload_too_large` | 413 |
//! | `unprocessable_document` | 422 |
//! | `generation_failed` | 502 |
//! | `internal` | 500 |
//!
//! # Deadlines
//!
//! Each request runs under `server.request_timeout_secs`. An expired
//! request is dropped at its next await point; a partly indexed upload may
//! leave entries behind, but namespace creation is a single statement and
//! never half-done.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use studymate_core::RagError;

use crate::chat::DEFAULT_HISTORY_LIMIT;
use crate::config::Config;
use crate::service::{ServiceError, StudyMate};

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    app: Arc<StudyMate>,
    deadline: Duration,
}

/// Initialise StudyMate from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(StudyMate::open(config.clone()).await?);
    serve(app).await
}

/// Serve an already initialised instance on `[server].bind`.
pub async fn serve(app: Arc<StudyMate>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();
    let router = router(app);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "StudyMate API listening");
    println!("StudyMate API listening on http://{}", bind_addr);
    axum::serve(listener, router).await?;

    Ok(())
}

/// Build the router for `app`.
pub fn router(app: Arc<StudyMate>) -> Router {
    let max_body = app.config().storage.max_upload_mb * 1024 * 1024 + MULTIPART_OVERHEAD_BYTES;
    let state = AppState {
        deadline: Duration::from_secs(app.config().server.request_timeout_secs),
        app,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route(
            "/documents/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(max_body)),
        )
        .route("/documents", get(handle_list_documents))
        .route("/documents/list", get(handle_list_documents))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/chat/query", post(handle_chat_query))
        .route("/chat/history", get(handle_chat_history))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"no_documents"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::UnsupportedFile(_) | ServiceError::InvalidDocumentId(_) => {
                bad_request(message)
            }
            ServiceError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
            }
            ServiceError::DocumentNotFound(_) => not_found(message),
            ServiceError::DocumentIdInUse(_) => {
                AppError::new(StatusCode::CONFLICT, "conflict", message)
            }
            ServiceError::Rag(rag) => classify_rag_error(rag),
            ServiceError::Internal(e) => {
                error!(error = %format!("{:#}", e), "internal error");
                internal(format!("{:#}", e))
            }
        }
    }
}

/// Map a pipeline failure to a status by the stage that failed.
fn classify_rag_error(err: RagError) -> AppError {
    let message = err.to_string();
    match err {
        RagError::NoDocuments { .. } => {
            AppError::new(StatusCode::NOT_FOUND, "no_documents", message)
        }
        RagError::Validation(_) => bad_request(message),
        RagError::Extraction(_) => {
            AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_document", message)
        }
        RagError::Generation(_) => {
            AppError::new(StatusCode::BAD_GATEWAY, "generation_failed", message)
        }
        RagError::Embedding(_) | RagError::Index(_) => {
            error!(stage = err.stage(), error = %message, "pipeline failure");
            internal(message)
        }
    }
}

/// Run `fut` under the configured per-request deadline.
async fn with_deadline<T, F>(state: &AppState, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(state.deadline, fut).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(timeout_error(format!(
            "request exceeded {}s deadline",
            state.deadline.as_secs()
        ))),
    }
}

// ============ User extraction ============

/// The authenticated user id from the [`USER_HEADER`] header.
struct UserId(String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| {
                AppError::new(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    format!("missing {} header", USER_HEADER),
                )
            })
    }
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
    status: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to StudyMate API!",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    document_id: String,
    filename: String,
    chunks: i64,
}

/// Handler for `POST /documents/upload`.
///
/// Reads the multipart field named `file` and hands it to the upload flow.
async fn handle_upload(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing multipart field 'file'"))?;

    let record = with_deadline(&state, state.app.upload(&user_id, &filename, bytes)).await?;
    Ok(Json(UploadResponse {
        message: "Document uploaded successfully",
        document_id: record.id,
        filename: record.filename,
        chunks: record.chunk_count,
    }))
}

#[derive(Serialize)]
struct DocumentInfo {
    id: String,
    filename: String,
    upload_date: String,
    num_chunks: i64,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<DocumentInfo>>, AppError> {
    let records = with_deadline(&state, state.app.list_documents(&user_id)).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| DocumentInfo {
                upload_date: r.upload_date_iso(),
                id: r.id,
                filename: r.filename,
                num_chunks: r.chunk_count,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    with_deadline(&state, state.app.delete_document(&user_id, &id)).await?;
    Ok(Json(MessageResponse {
        message: "Document deleted successfully",
    }))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    document_ids: Option<Vec<String>>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<String>,
    timestamp: String,
}

/// Handler for `POST /chat/query`.
async fn handle_chat_query(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = request.map_err(|e| bad_request(e.body_text()))?;
    let document_ids = request.document_ids.unwrap_or_default();

    let answer = with_deadline(
        &state,
        state
            .app
            .ask(&user_id, &request.message, &document_ids, request.top_k),
    )
    .await?;

    Ok(Json(ChatResponse {
        answer: answer.answer,
        sources: answer.sources,
        timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }))
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct HistoryItem {
    id: i64,
    question: String,
    answer: String,
    sources: Vec<String>,
    document_ids: Vec<String>,
    timestamp: String,
}

async fn handle_chat_history(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<HistoryItem>>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit < 1 {
        return Err(bad_request("limit must be >= 1"));
    }

    let entries = with_deadline(&state, state.app.history(&user_id, limit)).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| HistoryItem {
                id: e.id,
                timestamp: chrono::DateTime::from_timestamp(e.timestamp, 0)
                    .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_else(|| e.timestamp.to_string()),
                question: e.question,
                answer: e.answer,
                sources: e.sources,
                document_ids: e.document_ids,
            })
            .collect(),
    ))
}
