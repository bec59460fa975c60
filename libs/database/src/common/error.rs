use crate::common::retry::Transient;
use core_config::ConfigError;

/// Unified error type for connection management and health checks
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// ORM-side errors (SeaORM)
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sea_orm::DbErr),

    /// Raw-driver errors (sqlx)
    #[error("PostgreSQL driver error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection settings could not be resolved
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Health check failed
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),
}

impl Transient for DatabaseError {
    fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Postgres(e) => e.is_transient(),
            DatabaseError::Sqlx(e) => e.is_transient(),
            DatabaseError::Config(_) | DatabaseError::HealthCheckFailed(_) => false,
        }
    }
}

/// Result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;
