//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use pagechat_chat::{ChatOrchestrator, DocumentIntake};
use pagechat_core::config::PageChatConfig;

/// Shared application state. Cloned per request; every field is shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PageChatConfig>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub intake: Arc<DocumentIntake>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: PageChatConfig,
        orchestrator: Arc<ChatOrchestrator>,
        intake: Arc<DocumentIntake>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            intake,
            start_time: Instant::now(),
        }
    }
}
