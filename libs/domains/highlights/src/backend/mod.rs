//! Storage strategies for search, upsert and sync state
//!
//! Two implementations of each trait exist: [`FastPathBackend`] issues raw
//! SQL through the sqlx pool with retry wrapping, and [`OrmBackend`] goes
//! through SeaORM. [`ExecutionPath::select`] picks one from the deployment
//! settings; callers hold both behind a [`DualPath`] and never branch on
//! configuration themselves.

mod fast;
mod orm;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_config::DeploymentConfig;
use futures::stream::BoxStream;

use crate::error::HighlightResult;
use crate::models::{Highlight, SearchQuery, SearchResult};

pub use fast::{FastPathBackend, INTER_BATCH_PAUSE, UPSERT_BATCH_SIZE};
pub use orm::OrmBackend;

/// Single-pass, forward-only sequence of search results
pub type ResultStream = BoxStream<'static, HighlightResult<SearchResult>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Raw-driver queries, used for the managed backend or serverless deployments
    Fast,
    /// SeaORM queries, used for the local long-lived deployment
    Orm,
}

impl ExecutionPath {
    pub fn select(deployment: &DeploymentConfig) -> Self {
        if deployment.use_fast_path() {
            ExecutionPath::Fast
        } else {
            ExecutionPath::Orm
        }
    }
}

/// Similarity-ranked lookup for an already-computed query embedding
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Rows with a non-null embedding matching every supplied filter,
    /// ordered by ascending cosine distance, at most `query.k` of them.
    async fn search(
        &self,
        embedding: Vec<f32>,
        query: &SearchQuery,
    ) -> HighlightResult<ResultStream>;
}

/// Idempotent insert-or-update keyed on highlight id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpsertBackend: Send + Sync {
    /// Returns the number of highlights written.
    async fn upsert(&self, highlights: &[Highlight]) -> HighlightResult<usize>;
}

/// Per-service last-sync timestamp
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get_last_sync(&self, service: &str) -> HighlightResult<Option<DateTime<Utc>>>;

    /// Set `last_synced_at` for `service` to now, creating the row if needed.
    async fn record_sync_completed(&self, service: &str) -> HighlightResult<()>;
}

/// Both implementations of a backend trait plus the settings that choose between them
pub struct DualPath<T: ?Sized> {
    deployment: DeploymentConfig,
    fast: Arc<T>,
    orm: Arc<T>,
}

impl<T: ?Sized> Clone for DualPath<T> {
    fn clone(&self) -> Self {
        Self {
            deployment: self.deployment.clone(),
            fast: self.fast.clone(),
            orm: self.orm.clone(),
        }
    }
}

impl<T: ?Sized> DualPath<T> {
    pub fn new(deployment: DeploymentConfig, fast: Arc<T>, orm: Arc<T>) -> Self {
        Self {
            deployment,
            fast,
            orm,
        }
    }

    pub fn path(&self) -> ExecutionPath {
        ExecutionPath::select(&self.deployment)
    }

    /// Implementation for the current configuration
    pub fn active(&self) -> &Arc<T> {
        match self.path() {
            ExecutionPath::Fast => &self.fast,
            ExecutionPath::Orm => &self.orm,
        }
    }
}
