use std::sync::Arc;

use axum_helpers::ShutdownCoordinator;
use clap::Parser;
use core_config::server::ServerConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{DeploymentConfig, Environment, FromEnv};
use domain_highlights::AppContext;
use eyre::WrapErr;
use readwise_mcp::McpServer;
use tracing::info;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8375;

/// Streaming semantic search over TCP
#[derive(Debug, Parser)]
#[command(name = "readwise-mcp", version)]
struct Args {
    /// Bind host, overrides MCP_HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides MCP_PORT
    #[arg(long)]
    port: Option<u16>,
}

impl Args {
    fn server_config(&self) -> eyre::Result<ServerConfig> {
        let mut config = ServerConfig::from_env_with_prefix("MCP", DEFAULT_HOST, DEFAULT_PORT)?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let args = Args::parse();
    let environment = Environment::from_env();
    init_tracing(&environment);

    let server_config = args.server_config()?;
    let deployment = DeploymentConfig::from_env()?;
    info!(
        address = %server_config.address(),
        deploy_target = %deployment.deploy_target,
        db_backend = %deployment.db_backend,
        "Starting Readwise MCP server"
    );

    let ctx = Arc::new(AppContext::new(deployment));
    let server = McpServer::bind(server_config.address(), ctx.clone())
        .await
        .wrap_err_with(|| format!("Failed to bind {}", server_config.address()))?;

    let coordinator = ShutdownCoordinator::default();
    server
        .run(async move { coordinator.wait_for_signal().await })
        .await;

    info!("Closing database pools");
    ctx.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_env() {
        temp_env::with_vars([("MCP_HOST", Some("0.0.0.0")), ("MCP_PORT", Some("9000"))], || {
            let args = Args::parse_from(["readwise-mcp", "--port", "9100"]);
            let config = args.server_config().unwrap();
            assert_eq!(config.address(), "0.0.0.0:9100");
        });
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars([("MCP_HOST", None::<&str>), ("MCP_PORT", None)], || {
            let args = Args::parse_from(["readwise-mcp"]);
            assert_eq!(args.server_config().unwrap().address(), "127.0.0.1:8375");
        });
    }
}
