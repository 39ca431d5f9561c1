use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::application::ports::upload_store::UploadStore;

/// Writes uploads into a local directory, one UUID-named file each.
pub struct FsUploadStore {
    root: PathBuf,
    extension: &'static str,
}

impl FsUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "csv",
        }
    }
}

#[async_trait]
impl UploadStore for FsUploadStore {
    async fn save(&self, bytes: &[u8]) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create_uploads_dir {}", self.root.display()))?;
        let path = self
            .root
            .join(format!("{}.{}", Uuid::new_v4(), self.extension));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write_upload {}", path.display()))?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "upload_saved");
        Ok(path.to_string_lossy().into_owned())
    }
}
