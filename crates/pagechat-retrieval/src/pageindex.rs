//! HTTP client for a PageIndex-style document retrieval service.
//!
//! Endpoints, relative to the configured base URL, all authenticated with an
//! `api_key` header:
//!
//! | Call | Request | Response |
//! |---|---|---|
//! | submit | `POST /doc/` multipart `file` | `{"doc_id"}` |
//! | state | `GET /doc/{doc_id}/metadata/` | `{"status", "retrieval_ready"?, "error"?}` |
//! | query | `POST /retrieval/` `{"doc_id", "query"}` | `{"retrieval_id"}` |
//! | result | `GET /retrieval/{retrieval_id}/` | `{"status", "retrieved_nodes"}` |
//! | invalidate | `DELETE /doc/{doc_id}/` | any 2xx |
//!
//! Query results are produced asynchronously upstream; `query` polls the
//! result endpoint until it completes or the request timeout elapses.
//! Upstream ids are percent-encoded as single path segments.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use pagechat_core::config::RetrievalConfig;
use pagechat_core::types::{ContextSnippet, DocumentId, RetrievalHandle};

use crate::client::{rank_snippets, IndexState, RetrievalClient};
use crate::error::RetrievalError;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    doc_id: String,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retrieval_ready: Option<bool>,
    #[serde(default, alias = "message")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    retrieval_id: String,
}

#[derive(Debug, Deserialize)]
struct RetrievalResult {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retrieved_nodes: Vec<RetrievedNode>,
    #[serde(default, alias = "message")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetrievedNode {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    relevant_contents: Vec<RelevantContent>,
}

#[derive(Debug, Deserialize)]
struct RelevantContent {
    #[serde(default)]
    page_index: Option<u32>,
    relevant_content: String,
}

/// Flatten retrieved nodes into snippets.
///
/// Nodes without an explicit score get `1 / (rank + 1)` so service order is
/// preserved.
fn nodes_to_snippets(nodes: Vec<RetrievedNode>) -> Vec<ContextSnippet> {
    let mut snippets = Vec::new();
    for (rank, node) in nodes.into_iter().enumerate() {
        let relevance = node.score.unwrap_or(1.0 / (rank as f32 + 1.0));
        if node.relevant_contents.is_empty() {
            if let Some(text) = node.text.filter(|t| !t.trim().is_empty()) {
                snippets.push(ContextSnippet {
                    text,
                    relevance,
                    title: node.title,
                    page: None,
                });
            }
            continue;
        }
        for content in node.relevant_contents {
            if content.relevant_content.trim().is_empty() {
                continue;
            }
            snippets.push(ContextSnippet {
                text: content.relevant_content,
                relevance,
                title: node.title.clone(),
                page: content.page_index,
            });
        }
    }
    snippets
}

/// Retrieval client speaking the PageIndex HTTP API.
pub struct PageIndexClient {
    client: Client,
    base_url: Url,
    api_key: String,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl PageIndexClient {
    pub fn new(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RetrievalError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        let base_url = Url::parse(&config.endpoint).map_err(|e| {
            RetrievalError::Unavailable(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RetrievalError::Unavailable(format!(
                "invalid endpoint '{}': not a base URL",
                config.endpoint
            )));
        }
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            request_timeout,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// `segments` appended to the base path, with a trailing slash.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("api_key", &self.api_key)
    }

    fn transport_error(&self, err: reqwest::Error) -> RetrievalError {
        if err.is_timeout() {
            RetrievalError::Timeout(self.request_timeout)
        } else if err.is_decode() {
            RetrievalError::InvalidResponse(err.to_string())
        } else {
            RetrievalError::Unavailable(err.to_string())
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RetrievalError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        check_status(response).await
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RetrievalError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| self.transport_error(e))
    }

    async fn poll_result(&self, retrieval_id: &str) -> Result<Vec<RetrievedNode>, RetrievalError> {
        let url = self.url(&["retrieval", retrieval_id]);
        loop {
            let result: RetrievalResult = self.json(self.client.get(url.clone())).await?;
            match result.status.as_str() {
                "completed" | "done" => return Ok(result.retrieved_nodes),
                "failed" | "error" => {
                    return Err(RetrievalError::Upstream {
                        status: StatusCode::OK.as_u16(),
                        message: result
                            .error
                            .unwrap_or_else(|| "retrieval failed".to_string()),
                    })
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// Map non-success HTTP statuses to classified errors.
async fn check_status(response: Response) -> Result<Response, RetrievalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    let code = status.as_u16();
    Err(match status {
        StatusCode::PAYMENT_REQUIRED | StatusCode::TOO_MANY_REQUESTS => {
            RetrievalError::QuotaExceeded(message)
        }
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => RetrievalError::Rejected {
            status: code,
            message,
        },
        s if s.is_server_error() => RetrievalError::Unavailable(format!("{}: {}", code, message)),
        _ => RetrievalError::Upstream {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl RetrievalClient for PageIndexClient {
    async fn submit(
        &self,
        document_id: DocumentId,
        source: &Path,
    ) -> Result<RetrievalHandle, RetrievalError> {
        let bytes = tokio::fs::read(source).await?;
        let part = Part::bytes(bytes)
            .file_name(format!("{}.pdf", document_id))
            .mime_str("application/pdf")
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;
        let form = Form::new().part("file", part);

        let submitted: SubmitResponse = self
            .json(self.client.post(self.url(&["doc"])).multipart(form))
            .await?;
        debug!(document_id = %document_id, doc_id = %submitted.doc_id, "Document submitted for indexing");
        Ok(RetrievalHandle::new(submitted.doc_id))
    }

    async fn index_state(&self, handle: &RetrievalHandle) -> Result<IndexState, RetrievalError> {
        let meta: MetadataResponse = self
            .json(self.client.get(self.url(&["doc", handle.as_str(), "metadata"])))
            .await?;
        if meta.retrieval_ready == Some(true) {
            return Ok(IndexState::Ready);
        }
        Ok(match meta.status.as_str() {
            "completed" | "ready" => IndexState::Ready,
            "failed" | "error" => IndexState::Failed(
                meta.error
                    .unwrap_or_else(|| "indexing failed".to_string()),
            ),
            _ => IndexState::Processing,
        })
    }

    async fn query(
        &self,
        handle: &RetrievalHandle,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<ContextSnippet>, RetrievalError> {
        let body = serde_json::json!({
            "doc_id": handle.as_str(),
            "query": question,
        });
        let started: QueryResponse = self
            .json(self.client.post(self.url(&["retrieval"])).json(&body))
            .await?;

        let nodes = tokio::time::timeout(self.request_timeout, self.poll_result(&started.retrieval_id))
            .await
            .map_err(|_| RetrievalError::Timeout(self.request_timeout))??;

        Ok(rank_snippets(nodes_to_snippets(nodes), top_k))
    }

    async fn invalidate(&self, handle: &RetrievalHandle) -> Result<(), RetrievalError> {
        self.send(self.client.delete(self.url(&["doc", handle.as_str()])))
            .await?;
        Ok(())
    }
}
