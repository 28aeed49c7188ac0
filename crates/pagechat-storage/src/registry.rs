//! Document registry: metadata and processing status of every upload.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use pagechat_core::types::{Document, DocumentId, DocumentStatus, RetrievalHandle};

use crate::error::RegistryError;
use crate::state_machine::Transition;

/// Failure detail recorded for documents whose indexing task died with the
/// previous process.
pub const INTERRUPTED_DETAIL: &str = "interrupted: service restarted before indexing completed";

/// Source of truth for document lifecycle state.
///
/// Status changes go through [`Transition`], so every implementation enforces
/// the same state machine.
pub trait DocumentRegistry: Send + Sync {
    /// Create a `Pending` document. Does not start indexing.
    fn register(
        &self,
        id: DocumentId,
        filename: &str,
        source_path: &Path,
    ) -> Result<Document, RegistryError>;

    /// Apply a validated status transition.
    fn transition(&self, id: DocumentId, transition: Transition) -> Result<Document, RegistryError>;

    fn get(&self, id: DocumentId) -> Result<Document, RegistryError>;

    /// Remove the document and return what was removed.
    ///
    /// Deleting an unknown or already-deleted id fails with `NotFound`.
    fn delete(&self, id: DocumentId) -> Result<Document, RegistryError>;

    fn list(&self) -> Result<Vec<Document>, RegistryError>;

    fn mark_processing(&self, id: DocumentId) -> Result<Document, RegistryError> {
        self.transition(id, Transition::Processing)
    }

    fn mark_ready(
        &self,
        id: DocumentId,
        handle: RetrievalHandle,
    ) -> Result<Document, RegistryError> {
        self.transition(id, Transition::Ready(handle))
    }

    fn mark_failed(&self, id: DocumentId, detail: &str) -> Result<Document, RegistryError> {
        self.transition(id, Transition::Failed(detail.to_string()))
    }

    /// Fail every document left non-terminal by a previous process.
    ///
    /// Walks `Pending` documents through `Processing` so the state machine is
    /// respected. Returns the number of documents failed.
    fn recover_interrupted(&self) -> Result<usize, RegistryError> {
        let mut recovered = 0;
        for doc in self.list()? {
            match doc.status {
                DocumentStatus::Pending => {
                    self.mark_processing(doc.id)?;
                    self.mark_failed(doc.id, INTERRUPTED_DETAIL)?;
                }
                DocumentStatus::Processing => {
                    self.mark_failed(doc.id, INTERRUPTED_DETAIL)?;
                }
                DocumentStatus::Ready | DocumentStatus::Failed => continue,
            }
            recovered += 1;
        }
        Ok(recovered)
    }
}

/// Process-local registry backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryDocumentRegistry {
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryDocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RegistryError {
    RegistryError::Storage(format!("registry lock poisoned: {}", e))
}

impl DocumentRegistry for InMemoryDocumentRegistry {
    fn register(
        &self,
        id: DocumentId,
        filename: &str,
        source_path: &Path,
    ) -> Result<Document, RegistryError> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        if docs.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }
        let doc = Document::pending(id, filename, source_path.to_path_buf());
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    fn transition(&self, id: DocumentId, transition: Transition) -> Result<Document, RegistryError> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        let doc = docs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        transition.apply(doc)?;
        Ok(doc.clone())
    }

    fn get(&self, id: DocumentId) -> Result<Document, RegistryError> {
        let docs = self.documents.read().map_err(poisoned)?;
        docs.get(&id).cloned().ok_or(RegistryError::NotFound(id))
    }

    fn delete(&self, id: DocumentId) -> Result<Document, RegistryError> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        docs.remove(&id).ok_or(RegistryError::NotFound(id))
    }

    fn list(&self) -> Result<Vec<Document>, RegistryError> {
        let docs = self.documents.read().map_err(poisoned)?;
        let mut all: Vec<Document> = docs.values().cloned().collect();
        all.sort_by_key(|d| d.uploaded_at);
        Ok(all)
    }
}
