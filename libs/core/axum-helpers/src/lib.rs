//! # Axum Helpers
//!
//! Shared HTTP plumbing for the Readwise services.
//!
//! - **[`server`]**: router assembly with OpenAPI docs, production server, graceful shutdown
//! - **[`errors`]**: [`AppError`] and structured [`ErrorResponse`] bodies with error codes
//! - **[`extract`]**: [`AppJson`], a JSON body extractor that rejects with [`ErrorResponse`]
//! - **[`metrics`]**: Prometheus recorder and the `/metrics` route

pub mod errors;
pub mod extract;
pub mod metrics;
pub mod server;

pub use errors::{AppError, ErrorCode, ErrorResponse, error_response};
pub use extract::AppJson;
pub use self::metrics::{init_metrics, metrics_router};
pub use server::{
    ShutdownCoordinator, create_production_app, create_router, serve, shutdown_signal,
};
