//! Error taxonomy surfaced to chat, upload and delete callers.

use pagechat_core::error::PageChatError;
use pagechat_core::types::{DocumentId, DocumentStatus, SessionId};
use pagechat_llm::LlmError;
use pagechat_retrieval::RetrievalError;
use pagechat_storage::{MemoryError, RegistryError};

/// Why an upload was refused before registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("no file was provided")]
    MissingFile,
    #[error("filename is missing")]
    MissingFilename,
    #[error("file type not allowed: only {allowed} files are accepted")]
    UnsupportedExtension { allowed: String },
    #[error("file is empty")]
    Empty,
    #[error("file size {size} exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("file content is not a PDF document")]
    NotPdf,
}

/// Errors from chat, upload and delete operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("document {document_id} is not ready (status: {status})")]
    DocumentNotReady {
        document_id: DocumentId,
        status: DocumentStatus,
    },
    #[error("session {session_id} is bound to document {bound}, not {requested}")]
    SessionDocumentMismatch {
        session_id: SessionId,
        bound: DocumentId,
        requested: DocumentId,
    },
    #[error("retrieval service unavailable: {0}")]
    RetrievalUnavailable(String),
    #[error("retrieval service rejected the request: {0}")]
    RetrievalRejected(String),
    #[error("language model unavailable: {0}")]
    LlmUnavailable(String),
    #[error("language model rejected the request: {0}")]
    LlmRejected(String),
    #[error("upload rejected: {0}")]
    UploadRejected(#[from] UploadError),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    pub fn document_not_found(id: DocumentId) -> Self {
        ChatError::NotFound {
            kind: "document",
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: &SessionId) -> Self {
        ChatError::NotFound {
            kind: "session",
            id: id.to_string(),
        }
    }

    /// Transient upstream failures; resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::RetrievalUnavailable(_) | ChatError::LlmUnavailable(_)
        )
    }
}

impl From<RegistryError> for ChatError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ChatError::document_not_found(id),
            e @ RegistryError::InvalidTransition { .. } => ChatError::InvalidTransition(e.to_string()),
            e @ RegistryError::AlreadyExists(_) => ChatError::Storage(e.to_string()),
            RegistryError::Storage(msg) => ChatError::Storage(msg),
        }
    }
}

impl From<MemoryError> for ChatError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::SessionDocumentMismatch {
                session_id,
                bound,
                requested,
            } => ChatError::SessionDocumentMismatch {
                session_id,
                bound,
                requested,
            },
            MemoryError::Storage(msg) => ChatError::Storage(msg),
        }
    }
}

impl From<RetrievalError> for ChatError {
    fn from(err: RetrievalError) -> Self {
        if err.is_transient() {
            ChatError::RetrievalUnavailable(err.to_string())
        } else {
            ChatError::RetrievalRejected(err.to_string())
        }
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unavailable(msg) => ChatError::LlmUnavailable(msg),
            e @ (LlmError::Rejected { .. } | LlmError::InvalidResponse(_)) => {
                ChatError::LlmRejected(e.to_string())
            }
        }
    }
}

impl From<PageChatError> for ChatError {
    fn from(err: PageChatError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ChatError::RetrievalUnavailable("down".into()).is_retryable());
        assert!(ChatError::LlmUnavailable("timeout".into()).is_retryable());
        assert!(!ChatError::LlmRejected("filtered".into()).is_retryable());
        assert!(!ChatError::document_not_found(DocumentId::new()).is_retryable());
        assert!(!ChatError::EmptyMessage.is_retryable());
    }

    #[test]
    fn test_registry_not_found_maps_to_not_found() {
        let id = DocumentId::new();
        let err: ChatError = RegistryError::NotFound(id).into();
        assert_eq!(err.to_string(), format!("document not found: {}", id));
    }

    #[test]
    fn test_memory_mismatch_preserves_ids() {
        let session_id = SessionId::parse("s-1").unwrap();
        let bound = DocumentId::new();
        let requested = DocumentId::new();
        let err: ChatError = MemoryError::SessionDocumentMismatch {
            session_id: session_id.clone(),
            bound,
            requested,
        }
        .into();
        match err {
            ChatError::SessionDocumentMismatch {
                session_id: s,
                bound: b,
                requested: r,
            } => {
                assert_eq!(s, session_id);
                assert_eq!(b, bound);
                assert_eq!(r, requested);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_llm_error_classification() {
        let err: ChatError = LlmError::Unavailable("503".into()).into();
        assert!(matches!(err, ChatError::LlmUnavailable(_)));

        let err: ChatError = LlmError::Rejected {
            status: 400,
            message: "bad prompt".into(),
        }
        .into();
        assert!(matches!(err, ChatError::LlmRejected(_)));

        let err: ChatError = LlmError::InvalidResponse("no choices".into()).into();
        assert!(matches!(err, ChatError::LlmRejected(_)));
    }

    #[test]
    fn test_retrieval_error_classification() {
        let err: ChatError = RetrievalError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, ChatError::RetrievalUnavailable(_)));
        assert!(err.is_retryable());

        let err: ChatError = RetrievalError::Upstream {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(err.is_retryable());

        let err: ChatError = RetrievalError::Upstream {
            status: 404,
            message: "unknown doc_id".into(),
        }
        .into();
        assert!(matches!(err, ChatError::RetrievalRejected(_)));
        assert!(!err.is_retryable());

        let err: ChatError = RetrievalError::Rejected {
            status: 400,
            message: "bad query".into(),
        }
        .into();
        assert!(!err.is_retryable());

        let err: ChatError = RetrievalError::QuotaExceeded("monthly pages used".into()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_upload_error_display() {
        let err = ChatError::from(UploadError::TooLarge { size: 11, max: 10 });
        assert_eq!(
            err.to_string(),
            "upload rejected: file size 11 exceeds maximum of 10 bytes"
        );
    }
}
