//! Embedding Client
//!
//! [`EmbeddingProvider`] is the raw `embed(text) -> vector` call to the
//! provider. [`EmbeddingClient`] wraps one provider with token-limit
//! truncation and exponential backoff on rate limiting.

mod client;
mod openai;
mod provider;

pub use client::{BackoffPolicy, EmbeddingClient, MAX_INPUT_TOKENS};
pub use openai::{EMBEDDING_MODEL, OpenAIConfig, OpenAIProvider};
pub use provider::EmbeddingProvider;

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
