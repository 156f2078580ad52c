use anyhow::Result;
use async_trait::async_trait;

/// Text-completion backend. No vendor client ships with this crate.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Whether credentials and endpoint are present.
    fn is_ready(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str) -> Result<String>;
}
