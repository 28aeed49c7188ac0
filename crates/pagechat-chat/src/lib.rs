//! Chat orchestration for pagechat.
//!
//! Coordinates the document registry, retrieval adapter, conversation memory
//! and language model to answer one chat turn, and owns the two lifecycle
//! edges that touch all of them: accepting an upload and deleting a document.

pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod types;
pub mod upload;

pub use error::{ChatError, UploadError};
pub use orchestrator::ChatOrchestrator;
pub use prompt::Prompt;
pub use types::{ChatReply, ChatSettings};
pub use upload::{validate_upload, DocumentIntake, UploadPolicy};
