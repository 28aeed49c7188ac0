//! The retrieval service seam.

use std::path::Path;

use async_trait::async_trait;

use pagechat_core::types::{ContextSnippet, DocumentId, RetrievalHandle};

use crate::error::RetrievalError;

/// Indexing progress as reported by the retrieval service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Processing,
    Ready,
    Failed(String),
}

/// Narrow interface to the external document-indexing service.
///
/// Implementations enforce their own per-request timeouts and never retry.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    /// Submit the document stored at `source` and return its handle.
    /// Indexing continues upstream after this returns.
    async fn submit(
        &self,
        document_id: DocumentId,
        source: &Path,
    ) -> Result<RetrievalHandle, RetrievalError>;

    async fn index_state(&self, handle: &RetrievalHandle) -> Result<IndexState, RetrievalError>;

    /// Up to `top_k` snippets, most relevant first.
    ///
    /// "Nothing relevant" is an empty vector, never an error.
    async fn query(
        &self,
        handle: &RetrievalHandle,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ContextSnippet>, RetrievalError>;

    /// Release the handle upstream.
    async fn invalidate(&self, handle: &RetrievalHandle) -> Result<(), RetrievalError>;
}

/// Order snippets by descending relevance and keep the first `top_k`.
///
/// The sort is stable, so equally relevant snippets keep service order.
pub fn rank_snippets(mut snippets: Vec<ContextSnippet>, top_k: usize) -> Vec<ContextSnippet> {
    snippets.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    snippets.truncate(top_k);
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(text: &str, relevance: f32) -> ContextSnippet {
        ContextSnippet {
            text: text.to_string(),
            relevance,
            title: None,
            page: None,
        }
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let ranked = rank_snippets(
            vec![snippet("low", 0.1), snippet("high", 0.9), snippet("mid", 0.5)],
            2,
        );
        let texts: Vec<_> = ranked.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ranked = rank_snippets(vec![snippet("a", 0.5), snippet("b", 0.5)], 5);
        assert_eq!(ranked[0].text, "a");
        assert_eq!(ranked[1].text, "b");
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_snippets(Vec::new(), 3).is_empty());
    }
}
