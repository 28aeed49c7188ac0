//! Error types for the retrieval adapter.

use std::time::Duration;

use pagechat_core::types::DocumentId;
use pagechat_storage::RegistryError;

/// Errors from the retrieval service boundary.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval service unreachable: {0}")]
    Unavailable(String),
    #[error("retrieval request timed out after {0:?}")]
    Timeout(Duration),
    #[error("document rejected by retrieval service ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("retrieval quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("indexing failed upstream: {0}")]
    IndexingFailed(String),
    #[error("retrieval service error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("invalid response from retrieval service: {0}")]
    InvalidResponse(String),
    #[error("failed to read document bytes: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Short machine-readable class, used as the prefix of a failed
    /// document's error detail.
    pub fn class(&self) -> &'static str {
        match self {
            RetrievalError::Timeout(_) => "timeout",
            RetrievalError::Rejected { .. } => "rejected_format",
            RetrievalError::QuotaExceeded(_) => "quota_exceeded",
            RetrievalError::Unavailable(_) => "unavailable",
            RetrievalError::IndexingFailed(_)
            | RetrievalError::Upstream { .. }
            | RetrievalError::InvalidResponse(_) => "upstream",
            RetrievalError::Io(_) => "storage",
        }
    }

    /// `"<class>: <message>"`, recorded on a failed document.
    pub fn error_detail(&self) -> String {
        format!("{}: {}", self.class(), self)
    }

    /// Whether a later attempt could succeed without caller changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RetrievalError::Unavailable(_) | RetrievalError::Timeout(_)
        ) || matches!(self, RetrievalError::Upstream { status, .. } if *status >= 500)
    }
}

/// Errors from a single indexing run.
///
/// Indexing failures are absorbed into the document status; this type only
/// reports to the task what happened.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("indexing failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("document {0} was deleted while indexing")]
    Deleted(DocumentId),
}
