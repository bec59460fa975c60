use std::sync::Arc;

use async_trait::async_trait;
use core_config::{ConfigError, DeploymentConfig, FromEnv};
use database::postgres::DbManager;
use tokio::sync::OnceCell;
use tracing::info;

use crate::backend::{
    DualPath, FastPathBackend, OrmBackend, ResultStream, SearchBackend, SyncStateStore,
    UpsertBackend,
};
use crate::embedding::{EmbeddingClient, OpenAIProvider};
use crate::error::HighlightResult;
use crate::jobs::SyncJob;
use crate::models::SearchQuery;
use crate::readwise::HighlightSource;
use crate::search::SearchEngine;
use crate::service::SearchService;
use crate::sync_state::SyncStateTracker;
use crate::upsert::UpsertEngine;

/// Application-lifetime resources shared by every front-end.
///
/// Owns the connection pools (through [`DbManager`]) and the embedding
/// client, which is built on first use. [`AppContext::shutdown`] closes the
/// pools; the next request opens fresh ones.
pub struct AppContext {
    deployment: DeploymentConfig,
    db: Arc<DbManager>,
    fast: Arc<FastPathBackend>,
    orm: Arc<OrmBackend>,
    embedding: OnceCell<Arc<EmbeddingClient>>,
}

impl AppContext {
    pub fn new(deployment: DeploymentConfig) -> Self {
        Self::with_db(Arc::new(DbManager::new(deployment)))
    }

    /// Context over an existing manager
    pub fn with_db(db: Arc<DbManager>) -> Self {
        Self {
            deployment: db.deployment().clone(),
            fast: Arc::new(FastPathBackend::new(db.clone())),
            orm: Arc::new(OrmBackend::new(db.clone())),
            db,
            embedding: OnceCell::new(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let deployment = DeploymentConfig::from_env()?;
        info!(
            deploy_target = %deployment.deploy_target,
            db_backend = %deployment.db_backend,
            "Loaded deployment configuration"
        );
        Ok(Self::new(deployment))
    }

    /// Use `client` instead of building one from the environment
    pub fn with_embedding_client(self, client: Arc<EmbeddingClient>) -> Self {
        Self {
            embedding: OnceCell::new_with(Some(client)),
            ..self
        }
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    pub fn db(&self) -> &Arc<DbManager> {
        &self.db
    }

    /// Shared embedding client, created from `OPENAI_*` on first call
    pub async fn embedding_client(&self) -> HighlightResult<Arc<EmbeddingClient>> {
        let client = self
            .embedding
            .get_or_try_init(|| async {
                let provider = OpenAIProvider::from_env()?;
                let client = EmbeddingClient::new(Arc::new(provider))?;
                info!("Embedding client initialised");
                HighlightResult::Ok(Arc::new(client))
            })
            .await?;
        Ok(client.clone())
    }

    pub async fn search_engine(&self) -> HighlightResult<SearchEngine> {
        let backends = DualPath::<dyn SearchBackend>::new(
            self.deployment.clone(),
            self.fast.clone(),
            self.orm.clone(),
        );
        Ok(SearchEngine::new(self.embedding_client().await?, backends))
    }

    pub fn upsert_engine(&self) -> UpsertEngine {
        UpsertEngine::new(DualPath::<dyn UpsertBackend>::new(
            self.deployment.clone(),
            self.fast.clone(),
            self.orm.clone(),
        ))
    }

    pub fn sync_state_tracker(&self) -> SyncStateTracker {
        SyncStateTracker::new(DualPath::<dyn SyncStateStore>::new(
            self.deployment.clone(),
            self.fast.clone(),
            self.orm.clone(),
        ))
    }

    pub async fn sync_job(&self, source: Arc<dyn HighlightSource>) -> HighlightResult<SyncJob> {
        Ok(SyncJob::new(
            source,
            self.embedding_client().await?,
            self.upsert_engine(),
            self.sync_state_tracker(),
        ))
    }

    /// Close the connection pools
    pub async fn shutdown(&self) {
        self.db.shutdown().await;
        info!("Application context shut down");
    }
}

#[async_trait]
impl SearchService for AppContext {
    async fn search_stream(&self, query: SearchQuery) -> HighlightResult<ResultStream> {
        self.search_engine().await?.search_stream(&query).await
    }

    async fn ping(&self) -> HighlightResult<()> {
        Ok(self.db.ping().await?)
    }
}
