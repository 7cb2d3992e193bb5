use async_trait::async_trait;

use crate::error::CommonError;

/// Black-box text generation: a system framing plus a user prompt in, free-form text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, CommonError>;
}
