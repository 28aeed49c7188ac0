//! Document status state machine with validated transitions.
//!
//! Enforces the document lifecycle:
//! Pending -> Processing -> Ready | Failed
//! Ready and Failed are terminal; a failed document is re-uploaded, never
//! retried in place.

use chrono::Utc;

use pagechat_core::types::{Document, DocumentId, DocumentStatus, RetrievalHandle};

use crate::error::RegistryError;

/// Validate that a status transition is allowed.
pub fn validate_transition(
    document_id: DocumentId,
    from: DocumentStatus,
    to: DocumentStatus,
) -> Result<(), RegistryError> {
    let valid = matches!(
        (from, to),
        (DocumentStatus::Pending, DocumentStatus::Processing)
            | (DocumentStatus::Processing, DocumentStatus::Ready)
            | (DocumentStatus::Processing, DocumentStatus::Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition {
            document_id,
            from,
            to,
        })
    }
}

/// A requested status change together with the data the target status
/// requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Processing,
    Ready(RetrievalHandle),
    Failed(String),
}

impl Transition {
    pub fn target(&self) -> DocumentStatus {
        match self {
            Transition::Processing => DocumentStatus::Processing,
            Transition::Ready(_) => DocumentStatus::Ready,
            Transition::Failed(_) => DocumentStatus::Failed,
        }
    }

    /// Validate and apply the transition to `doc`.
    ///
    /// Keeps `retrieval_handle` set iff Ready and `error_detail` set iff Failed.
    pub fn apply(self, doc: &mut Document) -> Result<(), RegistryError> {
        validate_transition(doc.id, doc.status, self.target())?;
        doc.status = self.target();
        match self {
            Transition::Processing => {
                doc.retrieval_handle = None;
                doc.error_detail = None;
            }
            Transition::Ready(handle) => {
                doc.retrieval_handle = Some(handle);
                doc.error_detail = None;
            }
            Transition::Failed(detail) => {
                doc.retrieval_handle = None;
                doc.error_detail = Some(detail);
            }
        }
        doc.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Pending,
        DocumentStatus::Processing,
        DocumentStatus::Ready,
        DocumentStatus::Failed,
    ];

    fn doc() -> Document {
        Document::pending(DocumentId::new(), "a.pdf", PathBuf::from("a.pdf"))
    }

    #[test]
    fn test_only_forward_transitions_are_valid() {
        let id = DocumentId::new();
        let mut valid = Vec::new();
        for from in ALL {
            for to in ALL {
                if validate_transition(id, from, to).is_ok() {
                    valid.push((from, to));
                }
            }
        }
        assert_eq!(
            valid,
            vec![
                (DocumentStatus::Pending, DocumentStatus::Processing),
                (DocumentStatus::Processing, DocumentStatus::Ready),
                (DocumentStatus::Processing, DocumentStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_pending_cannot_skip_processing() {
        let id = DocumentId::new();
        assert!(validate_transition(id, DocumentStatus::Pending, DocumentStatus::Ready).is_err());
        assert!(validate_transition(id, DocumentStatus::Pending, DocumentStatus::Failed).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let id = DocumentId::new();
        for to in ALL {
            assert!(validate_transition(id, DocumentStatus::Ready, to).is_err());
            assert!(validate_transition(id, DocumentStatus::Failed, to).is_err());
        }
    }

    #[test]
    fn test_apply_ready_sets_handle() {
        let mut d = doc();
        Transition::Processing.apply(&mut d).unwrap();
        Transition::Ready(RetrievalHandle::new("pi-1")).apply(&mut d).unwrap();
        assert_eq!(d.status, DocumentStatus::Ready);
        assert_eq!(d.retrieval_handle, Some(RetrievalHandle::new("pi-1")));
        assert!(d.error_detail.is_none());
    }

    #[test]
    fn test_apply_failed_sets_detail_without_handle() {
        let mut d = doc();
        Transition::Processing.apply(&mut d).unwrap();
        Transition::Failed("timeout: too slow".into()).apply(&mut d).unwrap();
        assert_eq!(d.status, DocumentStatus::Failed);
        assert!(d.retrieval_handle.is_none());
        assert_eq!(d.error_detail.as_deref(), Some("timeout: too slow"));
    }

    #[test]
    fn test_rejected_apply_leaves_document_untouched() {
        let mut d = doc();
        let before = d.clone();
        let err = Transition::Ready(RetrievalHandle::new("x")).apply(&mut d).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(d, before);
    }
}
