//! Route handler functions for all API endpoints.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use pagechat_chat::{ChatError, UploadError};
use pagechat_core::types::{Document, DocumentId, DocumentStatus, SessionId, Turn};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentCounts {
    pub pending: u64,
    pub processing: u64,
    pub ready: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub documents: DocumentCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub document_id: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub error_detail: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            document_id: doc.id.to_string(),
            filename: doc.filename,
            status: doc.status,
            error_detail: doc.error_detail,
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// `document_id` is also accepted under its legacy name `pdf_id`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(alias = "pdf_id")]
    pub document_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub document_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

/// Unparseable ids cannot name an existing document.
fn parse_document_id(raw: &str) -> Result<DocumentId, ApiError> {
    raw.parse::<DocumentId>()
        .map_err(|_| ApiError::NotFound(format!("document not found: {}", raw)))
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("Welcome to {}", state.config.general.app_name),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let mut counts = DocumentCounts {
        pending: 0,
        processing: 0,
        ready: 0,
        failed: 0,
    };
    for doc in state.orchestrator.documents()? {
        match doc.status {
            DocumentStatus::Pending => counts.pending += 1,
            DocumentStatus::Processing => counts.processing += 1,
            DocumentStatus::Ready => counts.ready += 1,
            DocumentStatus::Failed => counts.failed += 1,
        }
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        documents: counts,
    }))
}

/// POST /upload - multipart form with a `file` field.
///
/// Responds `202 Accepted` with the `pending` document; indexing continues in
/// the background.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
        info!(filename = %filename, size = bytes.len(), "Upload received");

        let document = state.intake.accept(&filename, &bytes).await?;
        return Ok((StatusCode::ACCEPTED, Json(DocumentResponse::from(document))));
    }
    Err(ChatError::from(UploadError::MissingFile).into())
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let document_id = parse_document_id(&request.document_id)?;
    let session_id = match request.session_id.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            SessionId::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("invalid session_id: {:?}", raw)))?,
        ),
    };

    let reply = state
        .orchestrator
        .handle_chat(&request.message, document_id, session_id)
        .await?;

    Ok(Json(ChatResponse {
        reply: reply.reply,
        session_id: reply.session_id.to_string(),
        timestamp: reply.timestamp,
    }))
}

/// GET /documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = state.orchestrator.document(parse_document_id(&id)?)?;
    Ok(Json(document.into()))
}

/// DELETE /documents/{id} and DELETE /pdf/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let document_id = parse_document_id(&id)?;
    state.orchestrator.delete_document(document_id).await?;
    Ok(Json(DeleteResponse {
        message: format!("PDF {} deleted successfully", document_id),
        document_id: document_id.to_string(),
    }))
}

/// GET /sessions/{id}/history
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session_id = SessionId::parse(&id)
        .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;
    let turns = state.orchestrator.history(&session_id)?;
    Ok(Json(HistoryResponse {
        session_id: session_id.to_string(),
        turns,
    }))
}
