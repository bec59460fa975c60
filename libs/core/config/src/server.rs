use crate::{ConfigError, FromEnv, env_or_default, env_parse};
use std::net::Ipv4Addr;

/// Bind address for a network listener
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reads `{prefix}_HOST` / `{prefix}_PORT`, falling back to the given defaults.
    ///
    /// ```ignore
    /// // MCP_HOST / MCP_PORT, default 127.0.0.1:8375
    /// let config = ServerConfig::from_env_with_prefix("MCP", "127.0.0.1", 8375)?;
    /// ```
    pub fn from_env_with_prefix(
        prefix: &str,
        default_host: &str,
        default_port: u16,
    ) -> Result<Self, ConfigError> {
        let host = env_or_default(&format!("{prefix}_HOST"), default_host);
        let port = env_parse(&format!("{prefix}_PORT"), &default_port.to_string())?;
        Ok(Self { host, port })
    }
}

impl FromEnv for ServerConfig {
    /// Reads from environment variables with sensible defaults:
    /// - HOST: defaults to Ipv4Addr::UNSPECIFIED (0.0.0.0 - all interfaces)
    /// - PORT: defaults to 8080
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env_parse("PORT", "8080")?;

        Ok(Self { host, port })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED.to_string(), 8080)
    }
}
