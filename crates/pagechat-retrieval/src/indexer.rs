//! Background indexing of uploaded documents.
//!
//! Each upload gets one task that moves the document `Pending -> Processing`,
//! submits it, polls until the service reports a terminal state, and records
//! `Ready` or `Failed`. The whole run is bounded by the indexing deadline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use pagechat_core::config::RetrievalConfig;
use pagechat_core::types::{DocumentId, RetrievalHandle};
use pagechat_storage::{DocumentRegistry, RegistryError};

use crate::client::{IndexState, RetrievalClient};
use crate::error::{IndexError, RetrievalError};

pub struct Indexer {
    registry: Arc<dyn DocumentRegistry>,
    client: Arc<dyn RetrievalClient>,
    poll_interval: Duration,
    deadline: Duration,
}

impl Indexer {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        client: Arc<dyn RetrievalClient>,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            poll_interval,
            deadline,
        }
    }

    pub fn from_config(
        registry: Arc<dyn DocumentRegistry>,
        client: Arc<dyn RetrievalClient>,
        config: &RetrievalConfig,
    ) -> Self {
        Self::new(
            registry,
            client,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.index_timeout_secs),
        )
    }

    /// Run [`Indexer::index`] on the runtime. Outcomes are logged; the
    /// registry holds the result.
    pub fn spawn(self: &Arc<Self>, id: DocumentId, source: PathBuf) -> JoinHandle<()> {
        let indexer = Arc::clone(self);
        tokio::spawn(async move {
            match indexer.index(id, &source).await {
                Ok(handle) => info!(document_id = %id, handle = %handle, "Document indexed"),
                Err(IndexError::Deleted(_)) => {
                    info!(document_id = %id, "Document deleted during indexing; result discarded")
                }
                Err(IndexError::Retrieval(e)) => {
                    warn!(document_id = %id, class = e.class(), "Indexing failed: {}", e)
                }
                Err(e) => error!(document_id = %id, "Indexing task error: {}", e),
            }
        })
    }

    /// Index one document and record the outcome.
    ///
    /// A retrieval failure is recorded as `Failed` with a classified detail
    /// and also returned. If the document disappears from the registry
    /// mid-run, any handle obtained is invalidated and `Deleted` is returned.
    pub async fn index(&self, id: DocumentId, source: &Path) -> Result<RetrievalHandle, IndexError> {
        let started = Instant::now();
        self.registry.mark_processing(id).map_err(|e| deleted_or(id, e))?;
        debug!(document_id = %id, "Indexing started");

        let deadline = started + self.deadline;
        let submitted = match tokio::time::timeout_at(deadline, self.client.submit(id, source)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout(self.deadline)),
        };
        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => return self.fail(id, None, e).await,
        };

        let waited = match tokio::time::timeout_at(deadline, self.wait_until_indexed(&handle)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout(self.deadline)),
        };
        if let Err(e) = waited {
            return self.fail(id, Some(&handle), e).await;
        }

        match self.registry.mark_ready(id, handle.clone()) {
            Ok(_) => Ok(handle),
            Err(RegistryError::NotFound(_)) => {
                self.release(&handle).await;
                Err(IndexError::Deleted(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_until_indexed(&self, handle: &RetrievalHandle) -> Result<(), RetrievalError> {
        loop {
            match self.client.index_state(handle).await {
                Ok(IndexState::Ready) => return Ok(()),
                Ok(IndexState::Failed(reason)) => return Err(RetrievalError::IndexingFailed(reason)),
                Ok(IndexState::Processing) => {}
                Err(e) if e.is_transient() => {
                    debug!(handle = %handle, "Transient error while polling index state: {}", e)
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fail(
        &self,
        id: DocumentId,
        handle: Option<&RetrievalHandle>,
        cause: RetrievalError,
    ) -> Result<RetrievalHandle, IndexError> {
        if let Some(handle) = handle {
            self.release(handle).await;
        }
        match self.registry.mark_failed(id, &cause.error_detail()) {
            Ok(_) => Err(IndexError::Retrieval(cause)),
            Err(e) => Err(deleted_or(id, e)),
        }
    }

    async fn release(&self, handle: &RetrievalHandle) {
        if let Err(e) = self.client.invalidate(handle).await {
            warn!(handle = %handle, "Failed to invalidate retrieval handle: {}", e);
        }
    }
}

fn deleted_or(id: DocumentId, err: RegistryError) -> IndexError {
    match err {
        RegistryError::NotFound(_) => IndexError::Deleted(id),
        other => IndexError::Registry(other),
    }
}
