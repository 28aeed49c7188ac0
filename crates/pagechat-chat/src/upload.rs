//! Upload intake: boundary validation, blob storage, registration, and the
//! hand-off to background indexing.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use pagechat_core::config::UploadConfig;
use pagechat_core::types::{Document, DocumentId};
use pagechat_retrieval::Indexer;
use pagechat_storage::{DocumentRegistry, PdfStore};

use crate::error::{ChatError, UploadError};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Size and format limits applied before a document is registered.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: usize,
    /// Lowercase, without the dot.
    pub allowed_extensions: Vec<String>,
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

/// Check an upload against `policy` and return the sanitized filename.
///
/// Directory components of `filename` are dropped.
pub fn validate_upload(
    policy: &UploadPolicy,
    filename: &str,
    bytes: &[u8],
) -> Result<String, UploadError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(UploadError::MissingFilename)?;

    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let allowed = extension
        .as_deref()
        .is_some_and(|ext| policy.allowed_extensions.iter().any(|a| a == ext));
    if !allowed {
        return Err(UploadError::UnsupportedExtension {
            allowed: policy.allowed_extensions.join(", ").to_uppercase(),
        });
    }

    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > policy.max_file_size {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            max: policy.max_file_size,
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(UploadError::NotPdf);
    }
    Ok(name.to_string())
}

/// Accepts uploads and starts indexing without waiting for it.
pub struct DocumentIntake {
    registry: Arc<dyn DocumentRegistry>,
    blobs: PdfStore,
    indexer: Arc<Indexer>,
    policy: UploadPolicy,
}

impl DocumentIntake {
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        blobs: PdfStore,
        indexer: Arc<Indexer>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            registry,
            blobs,
            indexer,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate, store and register an upload, then spawn its indexing task.
    ///
    /// Returns the `Pending` document. Rejected uploads leave no trace.
    pub async fn accept(&self, filename: &str, bytes: &[u8]) -> Result<Document, ChatError> {
        let filename = validate_upload(&self.policy, filename, bytes)?;

        let id = DocumentId::new();
        let path = self.blobs.save(id, bytes).await?;
        let document = match self.registry.register(id, &filename, &path) {
            Ok(doc) => doc,
            Err(e) => {
                if let Err(cleanup) = self.blobs.remove(&path).await {
                    warn!(document_id = %id, "Failed to remove orphaned PDF: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        self.indexer.spawn(id, path);
        info!(document_id = %id, filename = %filename, size = bytes.len(), "Document uploaded");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use pagechat_core::types::{ContextSnippet, DocumentStatus, RetrievalHandle};
    use pagechat_retrieval::{IndexState, RetrievalClient, RetrievalError};
    use pagechat_storage::InMemoryDocumentRegistry;

    fn policy() -> UploadPolicy {
        UploadPolicy {
            max_file_size: 64,
            allowed_extensions: vec!["pdf".to_string()],
        }
    }

    #[test]
    fn test_valid_pdf_is_accepted() {
        let name = validate_upload(&policy(), "Report.PDF", b"%PDF-1.7 body").unwrap();
        assert_eq!(name, "Report.PDF");
    }

    #[test]
    fn test_directory_components_are_dropped() {
        let name = validate_upload(&policy(), "../../etc/report.pdf", b"%PDF-1.7").unwrap();
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            validate_upload(&policy(), "notes.txt", b"%PDF-"),
            Err(UploadError::UnsupportedExtension {
                allowed: "PDF".to_string()
            })
        );
        assert_eq!(
            validate_upload(&policy(), "noext", b"%PDF-"),
            Err(UploadError::UnsupportedExtension {
                allowed: "PDF".to_string()
            })
        );
        assert_eq!(validate_upload(&policy(), "", b"%PDF-"), Err(UploadError::MissingFilename));
        assert_eq!(validate_upload(&policy(), "a.pdf", b""), Err(UploadError::Empty));
        assert_eq!(
            validate_upload(&policy(), "a.pdf", b"<html>not a pdf</html>"),
            Err(UploadError::NotPdf)
        );
        assert_eq!(
            validate_upload(&policy(), "a.pdf", &[b'%'; 65]),
            Err(UploadError::TooLarge { size: 65, max: 64 })
        );
    }

    #[test]
    fn test_policy_from_config_normalizes_extensions() {
        let policy = UploadPolicy::from(&UploadConfig {
            allowed_extensions: vec![".PDF".to_string()],
            ..UploadConfig::default()
        });
        assert_eq!(policy.allowed_extensions, vec!["pdf".to_string()]);
    }

    struct InstantRetrieval;

    #[async_trait]
    impl RetrievalClient for InstantRetrieval {
        async fn submit(
            &self,
            document_id: DocumentId,
            source: &Path,
        ) -> Result<RetrievalHandle, RetrievalError> {
            assert!(source.exists());
            Ok(RetrievalHandle::new(format!("pi-{}", document_id)))
        }

        async fn index_state(&self, _handle: &RetrievalHandle) -> Result<IndexState, RetrievalError> {
            Ok(IndexState::Ready)
        }

        async fn query(
            &self,
            _handle: &RetrievalHandle,
            _question: &str,
            _top_k: usize,
        ) -> Result<Vec<ContextSnippet>, RetrievalError> {
            Ok(Vec::new())
        }

        async fn invalidate(&self, _handle: &RetrievalHandle) -> Result<(), RetrievalError> {
            Ok(())
        }
    }

    fn intake(dir: &Path) -> (Arc<InMemoryDocumentRegistry>, DocumentIntake) {
        let registry = Arc::new(InMemoryDocumentRegistry::new());
        let indexer = Arc::new(Indexer::new(
            registry.clone(),
            Arc::new(InstantRetrieval),
            Duration::from_millis(5),
            Duration::from_secs(5),
        ));
        let intake = DocumentIntake::new(
            registry.clone(),
            PdfStore::new(dir).unwrap(),
            indexer,
            policy(),
        );
        (registry, intake)
    }

    #[tokio::test]
    async fn test_accept_returns_pending_then_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, intake) = intake(dir.path());

        let doc = intake.accept("report.pdf", b"%PDF-1.4 content").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.filename, "report.pdf");
        assert!(doc.source_path.exists());

        let mut ready = false;
        for _ in 0..100 {
            if registry.get(doc.id).unwrap().is_ready() {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ready);
        let stored = registry.get(doc.id).unwrap();
        assert!(!stored.retrieval_handle.unwrap().as_str().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_upload_is_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, intake) = intake(dir.path());

        let err = intake.accept("report.pdf", b"plain text").await.unwrap_err();
        assert!(matches!(err, ChatError::UploadRejected(UploadError::NotPdf)));
        assert!(registry.list().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
