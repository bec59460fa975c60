use std::sync::Arc;
use std::time::Duration;

use axum_helpers::metrics::{init_metrics, metrics_router};
use axum_helpers::server::{create_production_app, create_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_highlights::{AppContext, handlers, metrics};
use eyre::WrapErr;
use tracing::info;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    info!(
        deploy_target = %config.deployment.deploy_target,
        db_backend = %config.deployment.db_backend,
        fast_path = config.deployment.use_fast_path(),
        "Starting Readwise search API"
    );

    let metrics_handle = init_metrics().wrap_err("Failed to install metrics recorder")?;
    metrics::describe_metrics();

    // Pools and the embedding client are created on first use
    let ctx = Arc::new(AppContext::new(config.deployment.clone()));
    let app = create_router::<handlers::ApiDoc>(
        handlers::router(ctx.clone()).merge(metrics_router(metrics_handle.clone())),
    );

    create_production_app(app, &config.server, Duration::from_secs(30), async move {
        info!("Shutting down: closing database pools");
        ctx.shutdown().await;
    })
    .await
    .wrap_err("Server error")?;

    info!("Readwise search API shutdown complete");
    Ok(())
}
