use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use core_config::ConfigError;
use database::{DatabaseError, Transient};
use thiserror::Error;

/// Failures of the embedding provider or of the client around it
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Embedding provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding provider returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Tokenizer unavailable: {0}")]
    Tokenizer(String),

    #[error("Embedding unavailable after {attempts} rate-limited attempts")]
    Unavailable { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Orm(#[from] sea_orm::DbErr),

    #[error("Connection error: {0}")]
    Connection(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Readwise API error: {0}")]
    Readwise(String),
}

pub type HighlightResult<T> = Result<T, HighlightError>;

impl Transient for HighlightError {
    fn is_transient(&self) -> bool {
        match self {
            HighlightError::Database(e) => e.is_transient(),
            HighlightError::Orm(e) => e.is_transient(),
            HighlightError::Connection(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convert HighlightError to AppError for standardized error responses
impl From<HighlightError> for AppError {
    fn from(err: HighlightError) -> Self {
        match err {
            HighlightError::Validation(msg) => AppError::UnprocessableEntity(msg),
            HighlightError::Embedding(EmbeddingError::Unavailable { .. }) => {
                AppError::ServiceUnavailable("Embedding service unavailable".to_string())
            }
            HighlightError::Embedding(e) => AppError::InternalServerError(e.to_string()),
            HighlightError::Connection(e) => {
                AppError::ServiceUnavailable(format!("Database unavailable: {e}"))
            }
            HighlightError::Database(e) => AppError::Database(e),
            HighlightError::Orm(e) => AppError::Orm(e),
            HighlightError::Config(e) => AppError::InternalServerError(e.to_string()),
            HighlightError::Readwise(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for HighlightError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
