use std::sync::Arc;
use std::time::Duration;

use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::{debug, warn};

use super::EmbeddingProvider;
use crate::error::EmbeddingError;

/// Model input limit in cl100k_base tokens
pub const MAX_INPUT_TOKENS: usize = 8191;

/// Backoff schedule for rate-limited embedding calls
///
/// Attempt `i` (0-based) that hits a rate limit is followed by a sleep of
/// `initial_delay * factor^i`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay.mul_f64(self.factor.powi(attempt as i32))
    }
}

/// Embedding provider wrapped with truncation and rate-limit backoff.
///
/// Construct once and share (`Arc`); the tokenizer and the provider's HTTP
/// client are reused across calls.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    tokenizer: CoreBPE,
    backoff: BackoffPolicy,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Result<Self, EmbeddingError> {
        let tokenizer = cl100k_base().map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        Ok(Self {
            provider,
            tokenizer,
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Embed `text`, truncating it to [`MAX_INPUT_TOKENS`] first if needed.
    ///
    /// Rate-limit failures are retried on the backoff schedule; any other
    /// provider error is returned immediately.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = self.truncate(text);

        for attempt in 0..self.backoff.max_attempts {
            match self.provider.embed(&input).await {
                Ok(embedding) => return Ok(embedding),
                Err(EmbeddingError::RateLimited(message)) => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs_f64(),
                        %message,
                        "Embedding rate limit exceeded, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(EmbeddingError::Unavailable {
            attempts: self.backoff.max_attempts,
        })
    }

    /// Token count of `text` under the model's encoding
    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_with_special_tokens(text).len()
    }

    fn truncate(&self, text: &str) -> String {
        let tokens = self.tokenizer.encode_with_special_tokens(text);
        if tokens.len() <= MAX_INPUT_TOKENS {
            return text.to_string();
        }

        warn!(
            tokens = tokens.len(),
            limit = MAX_INPUT_TOKENS,
            "Embedding input truncated"
        );

        // A cut can land inside a multi-byte character; drop tokens until it decodes
        let mut end = MAX_INPUT_TOKENS;
        while end > 0 {
            if let Ok(decoded) = self.tokenizer.decode(tokens[..end].to_vec()) {
                return decoded;
            }
            end -= 1;
        }
        debug!("Truncated input did not decode; sending empty text");
        String::new()
    }
}
