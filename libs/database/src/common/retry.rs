use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, warn};

/// Classifies an error as transient (worth retrying) or permanent.
///
/// Only connection-level failures qualify: a dropped or missing connection,
/// a failed connection attempt, an operation timeout, or an OS-level network
/// error. Everything else (constraint violations, bad SQL, decode errors)
/// is permanent and must surface on the first failure.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// SQLSTATE codes treated as transient.
///
/// Class 08 covers connection exceptions (`08003` connection_does_not_exist,
/// `08006` connection_failure, ...). `57014` is a statement timeout,
/// `57P01`..`57P03` are server shutdown / not-yet-accepting states.
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57014" | "57P01" | "57P02" | "57P03")
}

impl Transient for std::io::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::UnexpectedEof
                | ErrorKind::AddrNotAvailable
                | ErrorKind::HostUnreachable
                | ErrorKind::NetworkUnreachable
                | ErrorKind::NetworkDown
        )
    }
}

impl Transient for sqlx::Error {
    fn is_transient(&self) -> bool {
        match self {
            sqlx::Error::Io(e) => e.is_transient(),
            sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(e) => e.code().is_some_and(|code| is_transient_sqlstate(&code)),
            _ => false,
        }
    }
}

impl Transient for sea_orm::DbErr {
    fn is_transient(&self) -> bool {
        use sea_orm::{DbErr, RuntimeErr};

        match self {
            DbErr::ConnectionAcquire(_) => true,
            DbErr::Conn(RuntimeErr::SqlxError(e))
            | DbErr::Exec(RuntimeErr::SqlxError(e))
            | DbErr::Query(RuntimeErr::SqlxError(e)) => e.as_ref().is_transient(),
            DbErr::Conn(_) => true,
            _ => false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds
    pub initial_delay_ms: u64,

    /// Lower bound for any single delay in milliseconds
    pub min_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add jitter to prevent thundering herd
    pub use_jitter: bool,
}

impl RetryConfig {
    /// Defaults: 3 attempts, delays of 2s then 4s, clamped to 1s..=8s, no jitter.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_min_delay(mut self, delay_ms: u64) -> Self {
        self.min_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    pub fn with_jitter(mut self) -> Self {
        self.use_jitter = true;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let bounded = (raw as u64).clamp(self.min_delay_ms, self.max_delay_ms.max(self.min_delay_ms));

        let delay = if self.use_jitter {
            apply_jitter(bounded).max(self.min_delay_ms)
        } else {
            bounded
        };
        Duration::from_millis(delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            min_delay_ms: 1_000,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }
}

/// Retry an async operation with exponential backoff while `should_retry` holds.
///
/// Errors rejected by `should_retry` are returned immediately. When attempts
/// run out, the last error is returned unchanged.
///
/// # Example
/// ```ignore
/// use database::common::retry::{retry_with_backoff, RetryConfig};
///
/// let rows = retry_with_backoff(
///     || sqlx::query("SELECT 1").fetch_all(&pool),
///     RetryConfig::new().with_max_attempts(5),
///     |e: &sqlx::Error| matches!(e, sqlx::Error::PoolTimedOut),
/// )
/// .await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    config: RetryConfig,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) if attempt >= config.max_attempts => {
                warn!(attempts = attempt, error = %e, "Operation failed, giving up");
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Retry `operation` on transient errors only, for up to `max_attempts` attempts.
///
/// ```ignore
/// let rows = with_retry(|| query.fetch_all(&pool), 3).await?;
/// ```
pub async fn with_retry<F, Fut, T, E>(operation: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let config = RetryConfig::default().with_max_attempts(max_attempts);
    retry_with_backoff(operation, config, E::is_transient).await
}

/// Random value between 50% and 100% of `delay`
fn apply_jitter(delay: u64) -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let random_factor =
        (RandomState::new().hash_one(std::time::SystemTime::now()) % 50) as f64 / 100.0 + 0.5;

    (delay as f64 * random_factor) as u64
}
