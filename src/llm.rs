use anyhow::Result;
use async_trait::async_trait;

/// Completion model used to synthesize answers from retrieved context
#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
