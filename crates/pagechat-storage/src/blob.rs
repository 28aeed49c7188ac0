//! Raw PDF storage on the local file system.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use pagechat_core::error::PageChatError;
use pagechat_core::types::DocumentId;

/// Stores uploaded bytes as `<root>/<document_id>.pdf`.
#[derive(Debug, Clone)]
pub struct PdfStore {
    root: PathBuf,
}

impl PdfStore {
    /// Open the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PageChatError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("PDF storage directory ensured: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: DocumentId) -> PathBuf {
        self.root.join(format!("{}.pdf", id))
    }

    /// Write `bytes` for `id` and return the stored path.
    pub async fn save(&self, id: DocumentId, bytes: &[u8]) -> Result<PathBuf, PageChatError> {
        let path = self.path_for(id);
        tokio::fs::write(&path, bytes).await?;
        debug!(document_id = %id, path = %path.display(), size = bytes.len(), "PDF stored");
        Ok(path)
    }

    /// Remove a stored file. A missing file is not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), PageChatError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "PDF removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
