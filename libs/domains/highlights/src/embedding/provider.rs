use async_trait::async_trait;

use crate::error::EmbeddingError;

/// A text-embedding provider
///
/// Implementations perform a single request and report rate limiting as
/// [`EmbeddingError::RateLimited`]; retrying is left to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
