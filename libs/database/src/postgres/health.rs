use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use sqlx::PgPool;
use tracing::debug;

use crate::common::DatabaseError;

/// Check the ORM pool with `SELECT 1`.
pub async fn check_health(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    debug!("Running PostgreSQL health check");

    let stmt = Statement::from_string(DatabaseBackend::Postgres, "SELECT 1".to_owned());
    db.query_one_raw(stmt).await.map_err(|e| {
        DatabaseError::HealthCheckFailed(format!("PostgreSQL health check failed: {}", e))
    })?;

    debug!("PostgreSQL health check passed");
    Ok(())
}

/// Check the raw-driver pool with `SELECT 1`.
pub async fn check_pool_health(pool: &PgPool) -> Result<(), DatabaseError> {
    debug!("Running PostgreSQL raw pool health check");

    sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
        DatabaseError::HealthCheckFailed(format!("PostgreSQL health check failed: {}", e))
    })?;

    debug!("PostgreSQL raw pool health check passed");
    Ok(())
}
