//! Retrieval client adapter.
//!
//! Wraps the external document-indexing service: submitting documents,
//! tracking their indexing state, and querying ranked context snippets.
//! The [`Indexer`] runs indexing as background tasks and records the outcome
//! in the document registry.

pub mod client;
pub mod error;
pub mod indexer;
pub mod pageindex;

pub use client::{rank_snippets, IndexState, RetrievalClient};
pub use error::{IndexError, RetrievalError};
pub use indexer::Indexer;
pub use pageindex::PageIndexClient;
