use async_trait::async_trait;

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Persists bytes under a fresh unique name and returns the stored path.
    async fn save(&self, bytes: &[u8]) -> anyhow::Result<String>;
}
