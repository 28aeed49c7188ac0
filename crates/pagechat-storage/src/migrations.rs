//! Database schema migrations.
//!
//! Applies the initial schema: documents, sessions, turns, and the
//! schema_migrations bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use pagechat_core::error::PageChatError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), PageChatError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PageChatError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PageChatError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), PageChatError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id                  TEXT PRIMARY KEY NOT NULL,
            filename            TEXT NOT NULL,
            source_path         TEXT NOT NULL,
            status              TEXT NOT NULL
                                CHECK (status IN ('pending', 'processing', 'ready', 'failed')),
            retrieval_handle    TEXT,
            error_detail        TEXT,
            uploaded_at         INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL,
            CHECK ((status = 'ready') = (retrieval_handle IS NOT NULL)),
            CHECK ((status = 'failed') = (error_detail IS NOT NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_status
            ON documents (status);

        -- Sessions reference documents by id only: the registry and the
        -- conversation store are independent stores and the delete cascade
        -- is driven explicitly.
        CREATE TABLE IF NOT EXISTS sessions (
            id          TEXT PRIMARY KEY NOT NULL,
            document_id TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_document
            ON sessions (document_id);

        CREATE TABLE IF NOT EXISTS turns (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            text        TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_turns_session
            ON turns (session_id, seq);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| PageChatError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_ready_requires_handle() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO documents (id, filename, source_path, status, uploaded_at, updated_at)
             VALUES ('d1', 'a.pdf', 'a.pdf', 'ready', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_turns_cascade_with_session() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO sessions (id, document_id, created_at, updated_at) VALUES ('s', 'd', 0, 0);
             INSERT INTO turns (session_id, role, text, created_at) VALUES ('s', 'user', 'hi', 0);
             DELETE FROM sessions WHERE id = 's';",
        )
        .unwrap();
        let turns: i64 = conn
            .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(turns, 0);
    }
}
