//! pagechat API crate - axum HTTP server and route handlers.
//!
//! Exposes upload, chat, document status, deletion, session history and
//! health endpoints, and maps the chat error taxonomy onto HTTP statuses.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
