//! Chat orchestrator: answers one turn and cascades document deletion.
//!
//! The orchestrator keeps no state of its own beyond ordering locks. A chat
//! turn reads the registry and memory, queries retrieval, calls the model, and
//! writes the exchange to memory only after generation has succeeded.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use pagechat_core::types::{Document, DocumentId, DocumentStatus, Role, SessionId, Turn};
use pagechat_llm::LanguageModel;
use pagechat_retrieval::RetrievalClient;
use pagechat_storage::{ConversationStore, DocumentLocks, DocumentRegistry, PdfStore, SessionLocks};

use crate::error::ChatError;
use crate::prompt::Prompt;
use crate::types::{ChatReply, ChatSettings};

pub struct ChatOrchestrator {
    registry: Arc<dyn DocumentRegistry>,
    memory: Arc<dyn ConversationStore>,
    retrieval: Arc<dyn RetrievalClient>,
    llm: Arc<dyn LanguageModel>,
    blobs: PdfStore,
    session_locks: SessionLocks,
    document_locks: DocumentLocks,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        memory: Arc<dyn ConversationStore>,
        retrieval: Arc<dyn RetrievalClient>,
        llm: Arc<dyn LanguageModel>,
        blobs: PdfStore,
        settings: ChatSettings,
    ) -> Self {
        Self {
            registry,
            memory,
            retrieval,
            llm,
            blobs,
            session_locks: SessionLocks::new(),
            document_locks: DocumentLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Answer `message` about `document_id`.
    ///
    /// Without a `session_id` a fresh one is generated and returned. Turns on
    /// the same session run one at a time in arrival order. Nothing is written
    /// to memory unless generation succeeds, so a failed call can simply be
    /// resubmitted.
    pub async fn handle_chat(
        &self,
        message: &str,
        document_id: DocumentId,
        session_id: Option<SessionId>,
    ) -> Result<ChatReply, ChatError> {
        self.validate_message(message)?;
        let session_id = session_id.unwrap_or_else(SessionId::generate);

        let session_lock = self.session_locks.handle(&session_id);
        let _turn = session_lock.lock_owned().await;

        let document = self.registry.get(document_id)?;
        if document.status != DocumentStatus::Ready {
            return Err(ChatError::DocumentNotReady {
                document_id,
                status: document.status,
            });
        }
        let handle = document.retrieval_handle.ok_or_else(|| {
            ChatError::Storage(format!("ready document {} has no retrieval handle", document_id))
        })?;

        if let Some(bound) = self.memory.session_document(&session_id)? {
            if bound != document_id {
                return Err(ChatError::SessionDocumentMismatch {
                    session_id,
                    bound,
                    requested: document_id,
                });
            }
        }

        let context = self
            .retrieval
            .query(&handle, message, self.settings.top_k)
            .await?;
        let history = self
            .memory
            .recent_turns(&session_id, self.settings.max_history_turns)?;
        debug!(
            document_id = %document_id,
            session_id = %session_id,
            snippets = context.len(),
            history = history.len(),
            "Assembling prompt"
        );

        let prompt = Prompt::new(&self.settings.system_prompt, &context, &history, message).render();
        let reply = self.generate(&prompt).await?;

        // Deletion holds the write side while it purges sessions.
        let document_lock = self.document_locks.handle(&document_id);
        let _commit = document_lock.read_owned().await;
        self.registry.get(document_id)?;
        self.memory.append_turns(
            &session_id,
            document_id,
            &[Turn::now(Role::User, message), Turn::now(Role::Assistant, &reply)],
        )?;

        info!(document_id = %document_id, session_id = %session_id, "Chat turn completed");
        Ok(ChatReply {
            reply,
            session_id,
            timestamp: Utc::now(),
        })
    }

    fn validate_message(&self, message: &str) -> Result<(), ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.settings.max_message_length {
            return Err(ChatError::MessageTooLong(self.settings.max_message_length));
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let mut retries = 0;
        loop {
            match self.llm.generate(prompt, self.settings.generation).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && retries < self.settings.generation_retries => {
                    retries += 1;
                    warn!(attempt = retries, "Generation failed, retrying: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Delete a document and everything bound to it.
    ///
    /// Runs under the document's write lock, so in-flight commits drain first
    /// and later ones re-read the registry and fail with `NotFound`. Sessions
    /// are purged before the registry entry goes: if the purge fails the
    /// document is still there and the delete can be retried. Blob removal
    /// and upstream invalidation are best-effort.
    pub async fn delete_document(&self, document_id: DocumentId) -> Result<Document, ChatError> {
        self.registry.get(document_id)?;

        let document_lock = self.document_locks.handle(&document_id);
        let purge = document_lock.write_owned().await;
        let sessions = self.memory.delete_sessions_for_document(document_id)?;
        let document = self.registry.delete(document_id)?;
        drop(purge);
        self.document_locks.forget(&document_id);
        for session_id in &sessions {
            self.session_locks.forget(session_id);
        }

        if let Err(e) = self.blobs.remove(&document.source_path).await {
            warn!(document_id = %document_id, "Failed to remove stored PDF: {}", e);
        }
        if let Some(handle) = &document.retrieval_handle {
            if let Err(e) = self.retrieval.invalidate(handle).await {
                warn!(document_id = %document_id, "Failed to invalidate retrieval handle: {}", e);
            }
        }

        info!(
            document_id = %document_id,
            sessions = sessions.len(),
            "Document deleted"
        );
        Ok(document)
    }

    /// Remove sessions bound to documents that are no longer registered.
    ///
    /// Such sessions can no longer be chatted on or reached through a
    /// document delete. Run once at startup, after restart recovery.
    pub fn purge_orphaned_sessions(&self) -> Result<Vec<SessionId>, ChatError> {
        let live: HashSet<DocumentId> = self.registry.list()?.iter().map(|d| d.id).collect();
        let orphans = self.memory.retain_documents(&live)?;
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "Removed sessions of deleted documents");
        }
        Ok(orphans)
    }

    pub fn document(&self, document_id: DocumentId) -> Result<Document, ChatError> {
        Ok(self.registry.get(document_id)?)
    }

    pub fn documents(&self) -> Result<Vec<Document>, ChatError> {
        self.registry.list().map_err(ChatError::from)
    }

    /// Full stored history of a session, oldest first.
    pub fn history(&self, session_id: &SessionId) -> Result<Vec<Turn>, ChatError> {
        if self.memory.session_document(session_id)?.is_none() {
            return Err(ChatError::session_not_found(session_id));
        }
        Ok(self.memory.recent_turns(session_id, usize::MAX)?)
    }
}
