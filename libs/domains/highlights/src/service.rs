use async_trait::async_trait;

use crate::backend::ResultStream;
use crate::error::HighlightResult;
use crate::models::SearchQuery;

/// Search capability shared by the REST, SSE and TCP front-ends
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Lazily produced results in ascending distance order
    async fn search_stream(&self, query: SearchQuery) -> HighlightResult<ResultStream>;

    /// Trivial round trip to the database
    async fn ping(&self) -> HighlightResult<()>;
}
