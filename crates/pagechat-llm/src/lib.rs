//! Language model adapter.
//!
//! A single operation: turn an assembled prompt into reply text. The
//! adapter classifies failures as transient or permanent and never retries;
//! retry policy belongs to the caller.

pub mod client;
pub mod error;
pub mod http;

pub use client::{GenerationParams, LanguageModel};
pub use error::LlmError;
pub use http::HttpCompletionClient;
