use core_config::{DeploymentConfig, FromEnv, server::ServerConfig};

pub use core_config::Environment;

/// REST server configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub deployment: DeploymentConfig,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // HOST=0.0.0.0, PORT=8080
        let deployment = DeploymentConfig::from_env()?;

        Ok(Self {
            server,
            deployment,
            environment,
        })
    }
}
