pub mod config;
pub mod error;
pub mod types;

pub use config::PageChatConfig;
pub use error::{PageChatError, Result};
pub use types::*;
