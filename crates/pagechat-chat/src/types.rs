//! Chat settings and results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pagechat_core::config::PageChatConfig;
use pagechat_core::types::SessionId;
use pagechat_llm::GenerationParams;

/// Tunables for one chat turn, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub system_prompt: String,
    pub top_k: usize,
    /// Turns of history included in a prompt.
    pub max_history_turns: usize,
    /// Measured in characters.
    pub max_message_length: usize,
    /// Additional attempts after a transient generation failure.
    pub generation_retries: u32,
    pub generation: GenerationParams,
}

impl ChatSettings {
    pub fn from_config(config: &PageChatConfig) -> Self {
        Self {
            system_prompt: config.chat.system_prompt.clone(),
            top_k: config.retrieval.top_k,
            max_history_turns: config.memory.max_history_length,
            max_message_length: config.chat.max_message_length,
            generation_retries: config.chat.generation_retries,
            generation: GenerationParams::from(&config.llm),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&PageChatConfig::default())
    }
}

/// A successful chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}
