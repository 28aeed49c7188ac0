//! pagechat storage crate - document registry, conversation memory, SQLite
//! persistence, keyed ordering locks, and raw PDF blob storage.
//!
//! Both stores come in two flavours behind a trait: an in-memory version
//! used by tests and fakes, and a SQLite version (WAL mode) that survives
//! restarts.

pub mod blob;
pub mod db;
pub mod error;
pub mod locks;
pub mod memory;
pub mod migrations;
pub mod registry;
pub mod repository;
pub mod state_machine;

pub use blob::PdfStore;
pub use db::Database;
pub use error::{MemoryError, RegistryError};
pub use locks::{DocumentLocks, KeyedLocks, SessionLocks};
pub use memory::{ConversationStore, InMemoryConversationStore};
pub use registry::{DocumentRegistry, InMemoryDocumentRegistry};
pub use repository::{SqliteConversationStore, SqliteDocumentRegistry};
pub use state_machine::{validate_transition, Transition};
