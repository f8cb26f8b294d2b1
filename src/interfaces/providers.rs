use async_trait::async_trait;

use crate::error::Result;

/// Seam between the feature layer and whichever generative backend is wired
/// in. One prompt in, plain text out; everything else (rate limiting, usage
/// accounting, retries) lives above this trait.
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Cheap probe request used when the user enters a new key.
    async fn validate_key(&self) -> Result<()>;
}
