use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionMode {
    Custom,
    Strict,
}

impl SuggestionMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_uppercase()) {
            Some(s) if s == "STRICT" => SuggestionMode::Strict,
            _ => SuggestionMode::Custom,
        }
    }
}

/// Finds activities a desired activity could be placed in.
#[async_trait]
pub trait SuggestionPort: Send + Sync {
    async fn suggest(
        &self,
        desired_activity_id: i64,
        formatted: bool,
        mode: SuggestionMode,
    ) -> anyhow::Result<Value>;
}
