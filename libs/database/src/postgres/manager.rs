use core_config::DeploymentConfig;
use sea_orm::DatabaseConnection;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{PostgresConfig, check_health, check_pool_health, connect_orm, connect_raw};
use crate::common::DatabaseResult;

/// Lazily-created, cached connection pools for one process.
///
/// Each pool is created on first use from the deployment settings and reused
/// afterwards. Creation happens under a per-pool async lock, so concurrent
/// cold-start callers wait for the first one instead of racing to build
/// duplicate pools. [`DbManager::shutdown`] closes both pools and resets the
/// manager; the next `get_*` call builds fresh pools.
///
/// ```ignore
/// let manager = Arc::new(DbManager::new(DeploymentConfig::from_env()?));
/// let db = manager.get_query_handle().await?;
/// let pool = manager.get_raw_pool().await?;
/// manager.shutdown().await;
/// ```
pub struct DbManager {
    deployment: DeploymentConfig,
    orm: Mutex<Option<DatabaseConnection>>,
    raw: Mutex<Option<PgPool>>,
}

impl DbManager {
    pub fn new(deployment: DeploymentConfig) -> Self {
        Self {
            deployment,
            orm: Mutex::new(None),
            raw: Mutex::new(None),
        }
    }

    /// Manager pre-seeded with existing pools (tests, or callers that own the pools).
    pub fn with_handles(
        deployment: DeploymentConfig,
        orm: Option<DatabaseConnection>,
        raw: Option<PgPool>,
    ) -> Self {
        Self {
            deployment,
            orm: Mutex::new(orm),
            raw: Mutex::new(raw),
        }
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    /// ORM connection pool, created on first call.
    pub async fn get_query_handle(&self) -> DatabaseResult<DatabaseConnection> {
        let mut guard = self.orm.lock().await;
        if let Some(db) = guard.as_ref() {
            return Ok(db.clone());
        }

        let config = PostgresConfig::for_deployment(&self.deployment)?;
        let db = connect_orm(config).await?;
        *guard = Some(db.clone());
        Ok(db)
    }

    /// Raw-driver pool, created on first call.
    pub async fn get_raw_pool(&self) -> DatabaseResult<PgPool> {
        let mut guard = self.raw.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let config = PostgresConfig::for_deployment(&self.deployment)?;
        let pool = connect_raw(&config).await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Trivial connectivity check through the pool the active execution path uses.
    pub async fn ping(&self) -> DatabaseResult<()> {
        if self.deployment.use_fast_path() {
            check_pool_health(&self.get_raw_pool().await?).await
        } else {
            check_health(&self.get_query_handle().await?).await
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.orm.lock().await.is_some() || self.raw.lock().await.is_some()
    }

    /// Close both pools and reset to the uninitialised state.
    pub async fn shutdown(&self) {
        if let Some(db) = self.orm.lock().await.take() {
            match db.close().await {
                Ok(()) => info!("ORM pool closed"),
                Err(e) => warn!(error = %e, "Error while closing ORM pool"),
            }
        }

        if let Some(pool) = self.raw.lock().await.take() {
            pool.close().await;
            info!("Raw pool closed");
        }
    }
}
