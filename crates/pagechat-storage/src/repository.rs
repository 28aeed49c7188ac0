//! SQLite-backed implementations of the registry and conversation store.
//!
//! Both operate on a shared [`Database`] using raw SQL. Every multi-statement
//! operation runs inside a transaction under the connection mutex.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};

use pagechat_core::types::{Document, DocumentId, DocumentStatus, RetrievalHandle, SessionId, Turn};

use crate::db::Database;
use crate::error::{MemoryError, RegistryError};
use crate::memory::ConversationStore;
use crate::registry::DocumentRegistry;
use crate::state_machine::Transition;

const DOCUMENT_COLUMNS: &str =
    "id, filename, source_path, status, retrieval_handle, error_detail, uploaded_at, updated_at";

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Column values as stored, converted to a [`Document`] outside the rusqlite
/// row callback so parse failures surface as registry errors.
struct DocumentRow {
    id: String,
    filename: String,
    source_path: String,
    status: String,
    retrieval_handle: Option<String>,
    error_detail: Option<String>,
    uploaded_at: i64,
    updated_at: i64,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            source_path: row.get(2)?,
            status: row.get(3)?,
            retrieval_handle: row.get(4)?,
            error_detail: row.get(5)?,
            uploaded_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_document(self) -> Result<Document, RegistryError> {
        let id: DocumentId = self
            .id
            .parse()
            .map_err(|e| RegistryError::Storage(format!("corrupt document id '{}': {}", self.id, e)))?;
        let status: DocumentStatus = self.status.parse().map_err(RegistryError::Storage)?;
        Ok(Document {
            id,
            filename: self.filename,
            source_path: PathBuf::from(self.source_path),
            status,
            retrieval_handle: self.retrieval_handle.map(RetrievalHandle::new),
            error_detail: self.error_detail,
            uploaded_at: millis_to_utc(self.uploaded_at),
            updated_at: millis_to_utc(self.updated_at),
        })
    }
}

// =============================================================================
// SqliteDocumentRegistry
// =============================================================================

/// Durable document registry.
pub struct SqliteDocumentRegistry {
    db: Arc<Database>,
}

impl SqliteDocumentRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn find_document(
    conn: &rusqlite::Connection,
    id: DocumentId,
) -> Result<Option<Document>, RegistryError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![id.to_string()],
            DocumentRow::from_row,
        )
        .optional()?;
    row.map(DocumentRow::into_document).transpose()
}

impl DocumentRegistry for SqliteDocumentRegistry {
    fn register(
        &self,
        id: DocumentId,
        filename: &str,
        source_path: &Path,
    ) -> Result<Document, RegistryError> {
        let doc = Document::pending(id, filename, source_path.to_path_buf());
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO documents
                    (id, filename, source_path, status, uploaded_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    doc.id.to_string(),
                    doc.filename,
                    doc.source_path.to_string_lossy(),
                    doc.status.as_str(),
                    doc.uploaded_at.timestamp_millis(),
                    doc.updated_at.timestamp_millis(),
                ],
            )?;
            if inserted == 0 {
                return Err(RegistryError::AlreadyExists(id));
            }
            Ok(())
        })?;
        Ok(doc)
    }

    fn transition(&self, id: DocumentId, transition: Transition) -> Result<Document, RegistryError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut doc = find_document(&tx, id)?.ok_or(RegistryError::NotFound(id))?;
            transition.apply(&mut doc)?;
            tx.execute(
                "UPDATE documents
                 SET status = ?2, retrieval_handle = ?3, error_detail = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    doc.status.as_str(),
                    doc.retrieval_handle.as_ref().map(|h| h.as_str().to_string()),
                    doc.error_detail,
                    doc.updated_at.timestamp_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(doc)
        })
    }

    fn get(&self, id: DocumentId) -> Result<Document, RegistryError> {
        self.db
            .with_conn(|conn| find_document(conn, id))?
            .ok_or(RegistryError::NotFound(id))
    }

    fn delete(&self, id: DocumentId) -> Result<Document, RegistryError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let doc = find_document(&tx, id)?.ok_or(RegistryError::NotFound(id))?;
            tx.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
            tx.commit()?;
            Ok(doc)
        })
    }

    fn list(&self) -> Result<Vec<Document>, RegistryError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM documents ORDER BY uploaded_at ASC",
                DOCUMENT_COLUMNS
            ))?;
            let rows = stmt.query_map([], DocumentRow::from_row)?;
            let mut docs = Vec::new();
            for row in rows {
                docs.push(row?.into_document()?);
            }
            Ok(docs)
        })
    }
}

// =============================================================================
// SqliteConversationStore
// =============================================================================

/// Durable conversation store; history survives process restarts.
pub struct SqliteConversationStore {
    db: Arc<Database>,
}

impl SqliteConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn bound_document(
    conn: &rusqlite::Connection,
    session_id: &SessionId,
) -> Result<Option<DocumentId>, MemoryError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT document_id FROM sessions WHERE id = ?1",
            params![session_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| {
        s.parse::<DocumentId>()
            .map_err(|e| MemoryError::Storage(format!("corrupt document id '{}': {}", s, e)))
    })
    .transpose()
}

impl ConversationStore for SqliteConversationStore {
    fn append_turns(
        &self,
        session_id: &SessionId,
        document_id: DocumentId,
        turns: &[Turn],
    ) -> Result<(), MemoryError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let now = Utc::now().timestamp_millis();

            match bound_document(&tx, session_id)? {
                Some(bound) if bound != document_id => {
                    return Err(MemoryError::SessionDocumentMismatch {
                        session_id: session_id.clone(),
                        bound,
                        requested: document_id,
                    });
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE sessions SET updated_at = ?2 WHERE id = ?1",
                        params![session_id.as_str(), now],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO sessions (id, document_id, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?3)",
                        params![session_id.as_str(), document_id.to_string(), now],
                    )?;
                }
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO turns (session_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for turn in turns {
                    stmt.execute(params![
                        session_id.as_str(),
                        turn.role.as_str(),
                        turn.text,
                        turn.timestamp.timestamp_millis(),
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    fn recent_turns(
        &self,
        session_id: &SessionId,
        max_turns: usize,
    ) -> Result<Vec<Turn>, MemoryError> {
        if max_turns == 0 {
            return Ok(Vec::new());
        }
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role, text, created_at FROM (
                     SELECT seq, role, text, created_at FROM turns
                     WHERE session_id = ?1
                     ORDER BY seq DESC
                     LIMIT ?2
                 ) ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(
                params![session_id.as_str(), i64::try_from(max_turns).unwrap_or(i64::MAX)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?;

            let mut turns = Vec::new();
            for row in rows {
                let (role, text, created_at) = row?;
                turns.push(Turn {
                    role: role.parse().map_err(MemoryError::Storage)?,
                    text,
                    timestamp: millis_to_utc(created_at),
                });
            }
            Ok(turns)
        })
    }

    fn session_document(&self, session_id: &SessionId) -> Result<Option<DocumentId>, MemoryError> {
        self.db.with_conn(|conn| bound_document(conn, session_id))
    }

    fn turn_count(&self, session_id: &SessionId) -> Result<usize, MemoryError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<bool, MemoryError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE id = ?1",
                params![session_id.as_str()],
            )?;
            Ok(removed > 0)
        })
    }

    fn delete_sessions_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<SessionId>, MemoryError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM sessions WHERE document_id = ?1")?;
                let rows = stmt.query_map(params![document_id.to_string()], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            tx.execute(
                "DELETE FROM sessions WHERE document_id = ?1",
                params![document_id.to_string()],
            )?;
            tx.commit()?;
            Ok(ids.iter().filter_map(|id| SessionId::parse(id)).collect())
        })
    }

    fn retain_documents(&self, live: &HashSet<DocumentId>) -> Result<Vec<SessionId>, MemoryError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let bindings: Vec<(String, String)> = {
                let mut stmt = tx.prepare("SELECT id, document_id FROM sessions")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };

            let mut orphans = Vec::new();
            for (id, document_id) in bindings {
                let bound = document_id.parse::<DocumentId>().ok();
                if bound.is_some_and(|doc| live.contains(&doc)) {
                    continue;
                }
                tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
                if let Some(session_id) = SessionId::parse(&id) {
                    orphans.push(session_id);
                }
            }
            tx.commit()?;
            Ok(orphans)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagechat_core::types::Role;

    fn db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn sid(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    #[test]
    fn test_registry_roundtrip() {
        let reg = SqliteDocumentRegistry::new(db());
        let id = DocumentId::new();
        reg.register(id, "annual report.pdf", Path::new("/data/x.pdf"))
            .unwrap();

        let doc = reg.get(id).unwrap();
        assert_eq!(doc.filename, "annual report.pdf");
        assert_eq!(doc.source_path, PathBuf::from("/data/x.pdf"));
        assert_eq!(doc.status, DocumentStatus::Pending);
    }

    #[test]
    fn test_registry_duplicate_rejected() {
        let reg = SqliteDocumentRegistry::new(db());
        let id = DocumentId::new();
        reg.register(id, "a.pdf", Path::new("a.pdf")).unwrap();
        assert!(matches!(
            reg.register(id, "a.pdf", Path::new("a.pdf")),
            Err(RegistryError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_registry_transitions_persist() {
        let reg = SqliteDocumentRegistry::new(db());
        let id = DocumentId::new();
        reg.register(id, "a.pdf", Path::new("a.pdf")).unwrap();
        reg.mark_processing(id).unwrap();
        reg.mark_ready(id, RetrievalHandle::new("pi-abc")).unwrap();

        let doc = reg.get(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.retrieval_handle, Some(RetrievalHandle::new("pi-abc")));

        let err = reg.mark_failed(id, "late failure").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(reg.get(id).unwrap().status, DocumentStatus::Ready);
    }

    #[test]
    fn test_registry_failed_keeps_detail() {
        let reg = SqliteDocumentRegistry::new(db());
        let id = DocumentId::new();
        reg.register(id, "a.pdf", Path::new("a.pdf")).unwrap();
        reg.mark_processing(id).unwrap();
        reg.mark_failed(id, "quota_exceeded: monthly pages used").unwrap();
        let doc = reg.get(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(
            doc.error_detail.as_deref(),
            Some("quota_exceeded: monthly pages used")
        );
        assert!(doc.retrieval_handle.is_none());
    }

    #[test]
    fn test_registry_delete_twice() {
        let reg = SqliteDocumentRegistry::new(db());
        let id = DocumentId::new();
        reg.register(id, "a.pdf", Path::new("a.pdf")).unwrap();
        assert_eq!(reg.delete(id).unwrap().id, id);
        assert!(matches!(reg.delete(id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagechat.db");
        let id = DocumentId::new();
        {
            let reg = SqliteDocumentRegistry::new(Arc::new(Database::new(&path).unwrap()));
            reg.register(id, "a.pdf", Path::new("a.pdf")).unwrap();
            reg.mark_processing(id).unwrap();
        }
        let reg = SqliteDocumentRegistry::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(reg.get(id).unwrap().status, DocumentStatus::Processing);
        assert_eq!(reg.recover_interrupted().unwrap(), 1);
        assert_eq!(reg.get(id).unwrap().status, DocumentStatus::Failed);
    }

    #[test]
    fn test_store_recent_turns_window() {
        let store = SqliteConversationStore::new(db());
        let doc = DocumentId::new();
        for i in 0..5 {
            store
                .append_turn(&sid("s"), doc, Role::User, &format!("t{}", i))
                .unwrap();
        }
        let recent = store.recent_turns(&sid("s"), 2).unwrap();
        let texts: Vec<_> = recent.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["t3", "t4"]);
        assert!(store.recent_turns(&sid("unknown"), 5).unwrap().is_empty());
        assert!(store.recent_turns(&sid("s"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_store_mismatch_writes_nothing() {
        let store = SqliteConversationStore::new(db());
        let doc_a = DocumentId::new();
        store.append_turn(&sid("s"), doc_a, Role::User, "a").unwrap();
        let err = store
            .append_turns(
                &sid("s"),
                DocumentId::new(),
                &[Turn::now(Role::User, "b"), Turn::now(Role::Assistant, "c")],
            )
            .unwrap_err();
        assert!(matches!(err, MemoryError::SessionDocumentMismatch { .. }));
        assert_eq!(store.turn_count(&sid("s")).unwrap(), 1);
        assert_eq!(store.session_document(&sid("s")).unwrap(), Some(doc_a));
    }

    #[test]
    fn test_store_cascade_by_document() {
        let store = SqliteConversationStore::new(db());
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        store.append_turn(&sid("a"), doc_a, Role::User, "x").unwrap();
        store.append_turn(&sid("b"), doc_b, Role::User, "y").unwrap();

        let removed = store.delete_sessions_for_document(doc_a).unwrap();
        assert_eq!(removed, vec![sid("a")]);
        assert_eq!(store.turn_count(&sid("a")).unwrap(), 0);
        assert_eq!(store.session_document(&sid("a")).unwrap(), None);
        assert_eq!(store.turn_count(&sid("b")).unwrap(), 1);
    }

    #[test]
    fn test_store_retain_documents_sweeps_orphans() {
        let store = SqliteConversationStore::new(db());
        let live = DocumentId::new();
        store.append_turn(&sid("keep"), live, Role::User, "x").unwrap();
        store
            .append_turns(
                &sid("orphan"),
                DocumentId::new(),
                &[Turn::now(Role::User, "q"), Turn::now(Role::Assistant, "a")],
            )
            .unwrap();

        let removed = store.retain_documents(&HashSet::from([live])).unwrap();
        assert_eq!(removed, vec![sid("orphan")]);
        assert_eq!(store.session_document(&sid("orphan")).unwrap(), None);
        assert_eq!(store.turn_count(&sid("orphan")).unwrap(), 0);
        assert_eq!(store.turn_count(&sid("keep")).unwrap(), 1);
    }

    #[test]
    fn test_store_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagechat.db");
        let doc = DocumentId::new();
        {
            let store = SqliteConversationStore::new(Arc::new(Database::new(&path).unwrap()));
            store
                .append_turns(
                    &sid("s"),
                    doc,
                    &[Turn::now(Role::User, "q"), Turn::now(Role::Assistant, "a")],
                )
                .unwrap();
        }
        let store = SqliteConversationStore::new(Arc::new(Database::new(&path).unwrap()));
        let turns = store.recent_turns(&sid("s"), 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].text, "a");
    }
}
