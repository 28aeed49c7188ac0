//! Conversation memory: per-session, append-only turn history.
//!
//! A session is bound to one document on its first write and never rebound.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use pagechat_core::types::{DocumentId, Role, SessionId, Turn};

use crate::error::MemoryError;

/// Persistent store of ordered turn sequences keyed by session id.
pub trait ConversationStore: Send + Sync {
    /// Atomically append `turns`, in order, to the session.
    ///
    /// Creates the session bound to `document_id` on first call for an unseen
    /// id. Fails with `SessionDocumentMismatch` (writing nothing) if the
    /// session is bound to another document.
    fn append_turns(
        &self,
        session_id: &SessionId,
        document_id: DocumentId,
        turns: &[Turn],
    ) -> Result<(), MemoryError>;

    /// The last `max_turns` turns, oldest first. Unknown sessions yield an
    /// empty sequence.
    fn recent_turns(&self, session_id: &SessionId, max_turns: usize)
        -> Result<Vec<Turn>, MemoryError>;

    /// The document a session is bound to, if the session exists.
    fn session_document(&self, session_id: &SessionId) -> Result<Option<DocumentId>, MemoryError>;

    fn turn_count(&self, session_id: &SessionId) -> Result<usize, MemoryError>;

    /// Returns whether a session was removed.
    fn delete_session(&self, session_id: &SessionId) -> Result<bool, MemoryError>;

    /// Remove every session bound to `document_id`, returning their ids.
    fn delete_sessions_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<SessionId>, MemoryError>;

    /// Remove every session whose document is not in `live`, returning their
    /// ids. Used at startup to sweep sessions left behind by an interrupted
    /// delete.
    fn retain_documents(&self, live: &HashSet<DocumentId>) -> Result<Vec<SessionId>, MemoryError>;

    fn append_turn(
        &self,
        session_id: &SessionId,
        document_id: DocumentId,
        role: Role,
        text: &str,
    ) -> Result<(), MemoryError> {
        self.append_turns(session_id, document_id, &[Turn::now(role, text)])
    }
}

struct SessionRecord {
    document_id: DocumentId,
    turns: Vec<Turn>,
}

/// Process-local conversation store. Loses history on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> MemoryError {
    MemoryError::Storage(format!("memory lock poisoned: {}", e))
}

impl ConversationStore for InMemoryConversationStore {
    fn append_turns(
        &self,
        session_id: &SessionId,
        document_id: DocumentId,
        turns: &[Turn],
    ) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let record = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionRecord {
                document_id,
                turns: Vec::new(),
            });
        if record.document_id != document_id {
            return Err(MemoryError::SessionDocumentMismatch {
                session_id: session_id.clone(),
                bound: record.document_id,
                requested: document_id,
            });
        }
        record.turns.extend_from_slice(turns);
        Ok(())
    }

    fn recent_turns(
        &self,
        session_id: &SessionId,
        max_turns: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions
            .get(session_id)
            .map(|record| {
                let start = record.turns.len().saturating_sub(max_turns);
                record.turns[start..].to_vec()
            })
            .unwrap_or_default())
    }

    fn session_document(&self, session_id: &SessionId) -> Result<Option<DocumentId>, MemoryError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).map(|r| r.document_id))
    }

    fn turn_count(&self, session_id: &SessionId) -> Result<usize, MemoryError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).map_or(0, |r| r.turns.len()))
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<bool, MemoryError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(session_id).is_some())
    }

    fn delete_sessions_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<SessionId>, MemoryError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let doomed: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, r)| r.document_id == document_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            sessions.remove(id);
        }
        Ok(doomed)
    }

    fn retain_documents(&self, live: &HashSet<DocumentId>) -> Result<Vec<SessionId>, MemoryError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let mut orphans = Vec::new();
        sessions.retain(|id, record| {
            let keep = live.contains(&record.document_id);
            if !keep {
                orphans.push(id.clone());
            }
            keep
        });
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    fn texts(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_unknown_session_has_no_history() {
        let store = InMemoryConversationStore::new();
        assert!(store.recent_turns(&sid("nope"), 10).unwrap().is_empty());
        assert_eq!(store.session_document(&sid("nope")).unwrap(), None);
        assert_eq!(store.turn_count(&sid("nope")).unwrap(), 0);
    }

    #[test]
    fn test_append_creates_bound_session() {
        let store = InMemoryConversationStore::new();
        let doc = DocumentId::new();
        store.append_turn(&sid("s"), doc, Role::User, "hi").unwrap();
        assert_eq!(store.session_document(&sid("s")).unwrap(), Some(doc));
        assert_eq!(store.turn_count(&sid("s")).unwrap(), 1);
    }

    #[test]
    fn test_recent_turns_truncates_oldest_first() {
        let store = InMemoryConversationStore::new();
        let doc = DocumentId::new();
        for i in 0..7 {
            store
                .append_turn(&sid("s"), doc, Role::User, &format!("m{}", i))
                .unwrap();
        }
        let recent = store.recent_turns(&sid("s"), 3).unwrap();
        assert_eq!(texts(&recent), vec!["m4", "m5", "m6"]);

        let all = store.recent_turns(&sid("s"), 100).unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0].text, "m0");

        assert!(store.recent_turns(&sid("s"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_rebinding_session_is_rejected_without_writing() {
        let store = InMemoryConversationStore::new();
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        store.append_turn(&sid("s"), doc_a, Role::User, "a").unwrap();

        let err = store
            .append_turn(&sid("s"), doc_b, Role::User, "b")
            .unwrap_err();
        assert!(matches!(err, MemoryError::SessionDocumentMismatch { .. }));
        assert_eq!(store.turn_count(&sid("s")).unwrap(), 1);
        assert_eq!(store.session_document(&sid("s")).unwrap(), Some(doc_a));
    }

    #[test]
    fn test_append_turns_keeps_order() {
        let store = InMemoryConversationStore::new();
        let doc = DocumentId::new();
        store
            .append_turns(
                &sid("s"),
                doc,
                &[Turn::now(Role::User, "q"), Turn::now(Role::Assistant, "a")],
            )
            .unwrap();
        let turns = store.recent_turns(&sid("s"), 10).unwrap();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_delete_sessions_for_document() {
        let store = InMemoryConversationStore::new();
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        store.append_turn(&sid("a1"), doc_a, Role::User, "x").unwrap();
        store.append_turn(&sid("a2"), doc_a, Role::User, "x").unwrap();
        store.append_turn(&sid("b1"), doc_b, Role::User, "x").unwrap();

        let mut removed = store.delete_sessions_for_document(doc_a).unwrap();
        removed.sort();
        assert_eq!(removed, vec![sid("a1"), sid("a2")]);
        assert_eq!(store.turn_count(&sid("a1")).unwrap(), 0);
        assert_eq!(store.turn_count(&sid("b1")).unwrap(), 1);
    }

    #[test]
    fn test_retain_documents_drops_orphans() {
        let store = InMemoryConversationStore::new();
        let live = DocumentId::new();
        let gone = DocumentId::new();
        store.append_turn(&sid("keep"), live, Role::User, "x").unwrap();
        store.append_turn(&sid("orphan"), gone, Role::User, "x").unwrap();

        let removed = store.retain_documents(&HashSet::from([live])).unwrap();
        assert_eq!(removed, vec![sid("orphan")]);
        assert_eq!(store.session_document(&sid("orphan")).unwrap(), None);
        assert_eq!(store.turn_count(&sid("keep")).unwrap(), 1);
    }

    #[test]
    fn test_delete_session() {
        let store = InMemoryConversationStore::new();
        store
            .append_turn(&sid("s"), DocumentId::new(), Role::User, "x")
            .unwrap();
        assert!(store.delete_session(&sid("s")).unwrap());
        assert!(!store.delete_session(&sid("s")).unwrap());
    }
}
