//! Error type and retry helpers shared by the Postgres connectors and their callers

pub mod error;
pub mod retry;

pub use error::{DatabaseError, DatabaseResult};
pub use retry::{RetryConfig, Transient, retry_with_backoff, with_retry};
