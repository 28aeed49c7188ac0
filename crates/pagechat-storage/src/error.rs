//! Error types for the storage layer.

use pagechat_core::error::PageChatError;
use pagechat_core::types::{DocumentId, DocumentStatus, SessionId};

/// Errors from the document registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("document not found: {0}")]
    NotFound(DocumentId),
    #[error("document already registered: {0}")]
    AlreadyExists(DocumentId),
    #[error("invalid status transition for document {document_id}: {from} -> {to}")]
    InvalidTransition {
        document_id: DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PageChatError> for RegistryError {
    fn from(err: PageChatError) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

/// Errors from the conversation memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("session {session_id} is bound to document {bound}, not {requested}")]
    SessionDocumentMismatch {
        session_id: SessionId,
        bound: DocumentId,
        requested: DocumentId,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PageChatError> for MemoryError {
    fn from(err: PageChatError) -> Self {
        MemoryError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::Storage(err.to_string())
    }
}
