//! Deployment profile and database backend selection.
//!
//! Two independent knobs decide how the rest of the system talks to Postgres:
//!
//! - `DEPLOY_TARGET`: `docker` (long-lived container) or `vercel` (ephemeral function)
//! - `DB_BACKEND`: `local` (self-hosted Postgres) or `supabase` (managed Postgres)
//!
//! The connection URL is resolved from the backend, and resolution fails with a
//! descriptive [`ConfigError`] instead of falling back to another backend.

use crate::{ConfigError, FromEnv, env_optional, env_or_default};
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeployTarget {
    #[default]
    Docker,
    Vercel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DatabaseBackend {
    #[default]
    Local,
    Supabase,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub deploy_target: DeployTarget,
    pub db_backend: DatabaseBackend,
    pub local_db_url: Option<String>,
    pub supabase_db_url: Option<String>,
}

impl DeploymentConfig {
    pub fn new(deploy_target: DeployTarget, db_backend: DatabaseBackend) -> Self {
        Self {
            deploy_target,
            db_backend,
            ..Self::default()
        }
    }

    pub fn with_local_db_url(mut self, url: impl Into<String>) -> Self {
        self.local_db_url = Some(url.into());
        self
    }

    pub fn with_supabase_db_url(mut self, url: impl Into<String>) -> Self {
        self.supabase_db_url = Some(url.into());
        self
    }

    /// Ephemeral function deployments get small, short-lived pools.
    pub fn is_serverless(&self) -> bool {
        self.deploy_target == DeployTarget::Vercel
    }

    /// Raw-driver execution is used against managed Postgres or from ephemeral functions.
    pub fn use_fast_path(&self) -> bool {
        self.db_backend == DatabaseBackend::Supabase || self.is_serverless()
    }

    /// Connection URL for the selected backend.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        match self.db_backend {
            DatabaseBackend::Supabase => {
                self.supabase_db_url
                    .clone()
                    .ok_or_else(|| ConfigError::BackendUrlRequired {
                        key: "SUPABASE_DB_URL".to_string(),
                        backend: DatabaseBackend::Supabase.to_string(),
                    })
            }
            DatabaseBackend::Local => Ok(self
                .local_db_url
                .clone()
                .unwrap_or_else(default_local_url)),
        }
    }
}

/// `DATABASE_URL`, or a URL assembled from the docker-compose `POSTGRES_*` variables.
fn default_local_url() -> String {
    env_optional("DATABASE_URL").unwrap_or_else(|| {
        format!(
            "postgresql://{}:{}@localhost:5432/{}",
            env_or_default("POSTGRES_USER", "rw_user"),
            env_or_default("POSTGRES_PASSWORD", "rw_pass"),
            env_or_default("POSTGRES_DB", "readwise"),
        )
    })
}

impl FromEnv for DeploymentConfig {
    /// Reads `DEPLOY_TARGET`, `DB_BACKEND`, `LOCAL_DB_URL` and `SUPABASE_DB_URL`.
    ///
    /// A supabase backend without `SUPABASE_DB_URL` is rejected here so the
    /// process fails at startup rather than on the first query.
    fn from_env() -> Result<Self, ConfigError> {
        let deploy_target = parse_choice("DEPLOY_TARGET", "docker")?;
        let db_backend = parse_choice("DB_BACKEND", "local")?;

        let config = Self {
            deploy_target,
            db_backend,
            local_db_url: env_optional("LOCAL_DB_URL"),
            supabase_db_url: env_optional("SUPABASE_DB_URL"),
        };
        config.database_url()?;

        Ok(config)
    }
}

fn parse_choice<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    let raw = env_or_default(key, default);
    raw.trim().parse().map_err(|_| ConfigError::ParseError {
        key: key.to_string(),
        details: format!("unsupported value '{raw}'"),
    })
}
