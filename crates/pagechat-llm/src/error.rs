//! Error types for the language model adapter.

/// Errors from the language model boundary.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transient: network failure, timeout, overload, or 5xx.
    #[error("language model unavailable: {0}")]
    Unavailable(String),
    /// Permanent: the request was refused or the content was filtered.
    #[error("language model rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response from language model: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether retrying the same prompt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Unavailable(_))
    }
}
