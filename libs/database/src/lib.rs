//! Postgres connectivity for the highlight store
//!
//! - [`postgres::DbManager`] owns the lazily-created ORM (SeaORM) and raw-driver
//!   (sqlx) pools, sized by deployment profile.
//! - [`common::with_retry`] retries an async operation on transient connection
//!   failures and returns the original error when attempts run out.
//!
//! # Example
//!
//! ```ignore
//! use core_config::{DeploymentConfig, FromEnv};
//! use database::{postgres::DbManager, with_retry};
//!
//! let manager = DbManager::new(DeploymentConfig::from_env()?);
//! let pool = manager.get_raw_pool().await?;
//! let rows = with_retry(|| sqlx::query("SELECT 1").fetch_all(&pool), 3).await?;
//! manager.shutdown().await;
//! ```

pub mod common;
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult, RetryConfig, Transient, with_retry};
