//! Server assembly and graceful shutdown.
//!
//! ```ignore
//! use axum_helpers::server::{create_production_app, create_router};
//!
//! let app = create_router::<ApiDoc>(api_routes);
//! create_production_app(app, &ServerConfig::from_env()?, Duration::from_secs(30), async move {
//!     ctx.shutdown().await;
//! })
//! .await?;
//! ```

pub mod app;
pub mod shutdown;

pub use app::{create_production_app, create_router, serve};
pub use shutdown::{ShutdownCoordinator, shutdown_signal};
