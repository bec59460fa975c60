//! Highlights Domain
//!
//! Semantic search over Readwise highlights stored in Postgres with pgvector.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Handlers         │  ← REST + SSE (TCP lives in readwise_mcp)
//! └────────┬─────────┘
//!          │ SearchService
//! ┌────────▼─────────┐
//! │ Engines / Jobs   │  ← search, upsert, sync state, ingestion
//! └────────┬─────────┘
//!          │ DualPath (deployment picks one)
//! ┌────────▼─────────┐
//! │ Backends         │  ← FastPathBackend (sqlx + retry) | OrmBackend (SeaORM)
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │ DbManager        │  ← lazily created pools
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use domain_highlights::{AppContext, SearchQuery, handlers};
//!
//! let ctx = Arc::new(AppContext::from_env()?);
//!
//! let engine = ctx.search_engine().await?;
//! let results = engine.search(&SearchQuery::new("ownership").with_k(5)).await?;
//!
//! let router = handlers::router(ctx.clone());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod context;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod params;
pub mod parser;
pub mod readwise;
pub mod search;
pub mod service;
pub mod sync_state;
pub mod upsert;

// Re-export commonly used types
pub use backend::{DualPath, ExecutionPath, FastPathBackend, OrmBackend, ResultStream};
pub use context::AppContext;
pub use embedding::{EmbeddingClient, EmbeddingProvider, OpenAIProvider};
pub use error::{EmbeddingError, HighlightError, HighlightResult};
pub use jobs::SyncJob;
pub use models::{
    DateRange, Highlight, READWISE_SERVICE, SearchQuery, SearchRequest, SearchResponse,
    SearchResult, SyncReport, SyncState,
};
pub use params::{INVALID_QUERY, from_rpc_params};
pub use readwise::{HighlightSource, ReadwiseClient};
pub use search::SearchEngine;
pub use service::SearchService;
pub use sync_state::SyncStateTracker;
pub use upsert::UpsertEngine;
