pub mod codes;
pub mod handlers;

pub use codes::ErrorCode;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlxError};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Standard error response structure.
///
/// ```json
/// {
///   "code": 1009,
///   "error": "UNPROCESSABLE_ENTITY",
///   "message": "Missing or invalid 'q' parameter"
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Integer error code for logging and monitoring
    pub code: i32,
    /// Machine-readable error identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application error type that can be converted to HTTP responses.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Raw-driver (sqlx) failure
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// SeaORM failure
    #[error("ORM error: {0}")]
    Orm(#[from] DbErr),

    /// Body missing, not JSON, or not the expected shape
    #[error("JSON extraction error: {0}")]
    JsonExtractorRejection(#[from] JsonRejection),

    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String),

    #[error("Internal Server Error: {0}")]
    InternalServerError(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AppError::Database(e) => map_sqlx_error(&e),
            AppError::Orm(e) => map_orm_error(&e),
            AppError::JsonExtractorRejection(e) => {
                tracing::info!(
                    error_code = ErrorCode::JsonExtraction.code(),
                    "JSON extraction error: {:?}",
                    e
                );
                (e.status(), e.body_text(), ErrorCode::JsonExtraction)
            }
            AppError::UnprocessableEntity(msg) => {
                tracing::info!("Unprocessable entity: {}", msg);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    msg,
                    ErrorCode::UnprocessableEntity,
                )
            }
            AppError::InternalServerError(msg) => {
                tracing::error!(
                    error_code = ErrorCode::InternalError.code(),
                    "Internal server error: {}",
                    msg
                );
                (StatusCode::INTERNAL_SERVER_ERROR, msg, ErrorCode::InternalError)
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    msg,
                    ErrorCode::ServiceUnavailable,
                )
            }
        };

        error_response(status, message, code)
    }
}

/// Maps sqlx errors to status, message and code.
///
/// Connection-level failures become 503 so callers can tell an outage from
/// a bad query.
fn map_sqlx_error(error: &SqlxError) -> (StatusCode, String, ErrorCode) {
    let code = match error {
        SqlxError::RowNotFound => ErrorCode::DatabaseNotFound,
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) | SqlxError::Tls(_) => {
            ErrorCode::DatabaseUnavailable
        }
        SqlxError::Database(_) => ErrorCode::DatabaseError,
        SqlxError::Decode(_) | SqlxError::ColumnDecode { .. } => ErrorCode::DatabaseDecode,
        _ => ErrorCode::DatabaseUnhandled,
    };
    database_response(code, error)
}

fn map_orm_error(error: &DbErr) -> (StatusCode, String, ErrorCode) {
    let code = match error {
        DbErr::RecordNotFound(_) => ErrorCode::DatabaseNotFound,
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => ErrorCode::DatabaseUnavailable,
        DbErr::Exec(_) | DbErr::Query(_) => ErrorCode::DatabaseError,
        DbErr::Type(_) | DbErr::Json(_) => ErrorCode::DatabaseDecode,
        _ => ErrorCode::DatabaseUnhandled,
    };
    database_response(code, error)
}

fn database_response(
    code: ErrorCode,
    error: &dyn std::fmt::Debug,
) -> (StatusCode, String, ErrorCode) {
    let status = match code {
        ErrorCode::DatabaseNotFound => StatusCode::NOT_FOUND,
        ErrorCode::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error_code = code.code(), "Database error: {:?}", error);
    } else {
        tracing::info!(error_code = code.code(), "Database error: {:?}", error);
    }

    (status, code.default_message().to_string(), code)
}

/// Build a JSON [`ErrorResponse`] with the given status.
pub fn error_response(status: StatusCode, message: String, error_code: ErrorCode) -> Response {
    let body = Json(ErrorResponse {
        code: error_code.code(),
        error: error_code.as_str().to_string(),
        message,
        details: None,
    });

    (status, body).into_response()
}
