//! PostgreSQL connection management
//!
//! Pool sizing by deployment profile, ORM and raw-driver connectors, the
//! process-wide [`DbManager`], health checks and migration running.

mod config;
mod connector;
mod health;
mod manager;

pub use config::{OrmPoolSizing, PoolProfile, PostgresConfig, RawPoolSizing};
pub use connector::{connect_orm, connect_raw, run_migrations};
pub use health::{check_health, check_pool_health};
pub use manager::DbManager;

// Re-export driver types for convenience
pub use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
pub use sea_orm_migration::MigratorTrait;
pub use sqlx::PgPool;
