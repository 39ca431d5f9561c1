use async_trait::async_trait;

use crate::domain::parameters::Parameter;

#[async_trait]
pub trait ParameterRepository: Send + Sync {
    async fn get(&self, label: &str) -> anyhow::Result<Option<Parameter>>;
    /// Creates the parameter with `value_type` when missing, then stores `value`.
    async fn upsert(&self, label: &str, value_type: &str, value: &str) -> anyhow::Result<()>;
}
