use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, instrument};

use crate::backend::{DualPath, ResultStream, SearchBackend};
use crate::embedding::EmbeddingClient;
use crate::error::HighlightResult;
use crate::models::{SearchQuery, SearchResult};

/// Vector search over stored highlights.
///
/// Embeds the query text, then delegates to whichever [`SearchBackend`] the
/// deployment selects. [`SearchEngine::search_stream`] hands results out one
/// at a time; [`SearchEngine::search`] collects them.
#[derive(Clone)]
pub struct SearchEngine {
    embedder: Arc<EmbeddingClient>,
    backends: DualPath<dyn SearchBackend>,
}

impl SearchEngine {
    pub fn new(embedder: Arc<EmbeddingClient>, backends: DualPath<dyn SearchBackend>) -> Self {
        Self { embedder, backends }
    }

    /// Lazy, single-pass result sequence in ascending distance order
    #[instrument(skip(self, query), fields(k = query.k, path = ?self.backends.path()))]
    pub async fn search_stream(&self, query: &SearchQuery) -> HighlightResult<ResultStream> {
        let embedding = self.embedder.embed(&query.q).await?;
        debug!(dimensions = embedding.len(), "Query embedded");
        self.backends.active().search(embedding, query).await
    }

    /// Every result, collected before returning
    pub async fn search(&self, query: &SearchQuery) -> HighlightResult<Vec<SearchResult>> {
        self.search_stream(query).await?.try_collect().await
    }
}
