//! API error types and JSON error response formatting.
//!
//! Every failure renders as `{"error": <code>, "message": <text>}` with an
//! HTTP status chosen from the chat error kind.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use pagechat_chat::{ChatError, UploadError};

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),
    /// 404
    NotFound(String),
    /// 409, e.g. document not ready or session bound elsewhere.
    Conflict(String),
    /// 413
    PayloadTooLarge(String),
    /// 500. The message is returned as-is, so it must already be sanitized.
    Internal(String),
    /// 502, upstream refused the request.
    BadGateway(String),
    /// 503, upstream temporarily unavailable. Safe to retry.
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn from_multipart(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "upstream_rejected", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let details = (status == StatusCode::SERVICE_UNAVAILABLE)
            .then(|| serde_json::json!({ "retryable": true }));
        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            e @ ChatError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            e @ (ChatError::DocumentNotReady { .. }
            | ChatError::SessionDocumentMismatch { .. }
            | ChatError::InvalidTransition(_)) => ApiError::Conflict(e.to_string()),
            e @ ChatError::UploadRejected(UploadError::TooLarge { .. }) => {
                ApiError::PayloadTooLarge(e.to_string())
            }
            e @ (ChatError::UploadRejected(_)
            | ChatError::EmptyMessage
            | ChatError::MessageTooLong(_)) => ApiError::BadRequest(e.to_string()),
            e @ (ChatError::RetrievalUnavailable(_) | ChatError::LlmUnavailable(_)) => {
                ApiError::ServiceUnavailable(e.to_string())
            }
            e @ (ChatError::RetrievalRejected(_) | ChatError::LlmRejected(_)) => {
                ApiError::BadGateway(e.to_string())
            }
            ChatError::Storage(msg) => {
                error!("Storage failure while handling request: {}", msg);
                ApiError::Internal("internal storage error".to_string())
            }
        }
    }
}
