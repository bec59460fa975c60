use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database::{postgres::DbManager, with_retry};
use futures::StreamExt;
use pgvector::Vector;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::{ResultStream, SearchBackend, SyncStateStore, UpsertBackend};
use crate::error::HighlightResult;
use crate::models::{DateRange, Highlight, ScoredHighlight, SearchQuery, SearchResult};

/// Rows per multi-row `INSERT` statement
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Pause between upsert batches against the shared serverless connection budget
pub const INTER_BATCH_PAUSE: Duration = Duration::from_millis(100);

const RETRY_ATTEMPTS: u32 = 3;

const RESULT_COLUMNS: &str = "id, text, source_type, source_id, source_author, source_title, \
     source_url, highlighted_at, updated_at, tags";

const INSERT_COLUMNS: [&str; 14] = [
    "id",
    "text",
    "source_type",
    "source_id",
    "source_author",
    "source_title",
    "source_url",
    "category",
    "note",
    "location",
    "highlighted_at",
    "updated_at",
    "tags",
    "embedding",
];

/// Raw-driver backend over the sqlx pool.
///
/// Every statement runs inside [`with_retry`]. The `highlighted_at` range is
/// not part of the SQL; it is applied to the fetched rows afterwards, so a
/// date-filtered search can return fewer than `k` results even when more
/// matching rows exist.
pub struct FastPathBackend {
    db: Arc<DbManager>,
    batch_size: usize,
}

impl FastPathBackend {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self {
            db,
            batch_size: UPSERT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Similarity query with one predicate per supplied filter.
pub(crate) fn build_search_query(
    embedding: Vector,
    query: &SearchQuery,
) -> QueryBuilder<Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(RESULT_COLUMNS);
    qb.push(if query.include_embedding {
        ", embedding"
    } else {
        ", NULL::vector AS embedding"
    });
    qb.push(", (embedding <=> ");
    qb.push_bind(embedding);
    qb.push(")::float8 AS score FROM highlight WHERE embedding IS NOT NULL");

    if let Some(source_type) = &query.source_type {
        qb.push(" AND source_type = ");
        qb.push_bind(source_type.clone());
    }
    if let Some(author) = &query.author {
        qb.push(" AND source_author = ");
        qb.push_bind(author.clone());
    }
    if let Some(tags) = query.tags.as_ref().filter(|tags| !tags.is_empty()) {
        qb.push(" AND tags && ");
        qb.push_bind(tags.clone());
    }

    qb.push(" ORDER BY score ASC LIMIT ");
    qb.push_bind(i64::try_from(query.k).unwrap_or(i64::MAX));
    qb
}

/// Multi-row insert that overwrites every column but `id` on conflict.
pub(crate) fn build_upsert_query(batch: &[Highlight]) -> QueryBuilder<Postgres> {
    let mut qb = QueryBuilder::new("INSERT INTO highlight (");
    qb.push(INSERT_COLUMNS.join(", "));
    qb.push(") ");

    qb.push_values(batch, |mut row, h| {
        row.push_bind(h.id)
            .push_bind(h.text.clone())
            .push_bind(h.source_type.clone())
            .push_bind(h.source_id.clone())
            .push_bind(h.source_author.clone())
            .push_bind(h.source_title.clone())
            .push_bind(h.source_url.clone())
            .push_bind(h.category.clone())
            .push_bind(h.note.clone())
            .push_bind(h.location)
            .push_bind(h.highlighted_at)
            .push_bind(h.updated_at)
            .push_bind(h.tags.clone())
            .push_bind(h.embedding.clone().map(Vector::from));
    });

    let updates = INSERT_COLUMNS
        .iter()
        .skip(1)
        .map(|col| format!("{col} = EXCLUDED.{col}"))
        .collect::<Vec<_>>()
        .join(", ");
    qb.push(" ON CONFLICT (id) DO UPDATE SET ");
    qb.push(updates);
    qb
}

/// Drop results whose `highlighted_at` is missing, unparseable or outside `range`.
///
/// Relative order of the surviving results is unchanged.
pub fn retain_in_date_range(
    results: impl IntoIterator<Item = SearchResult>,
    range: Option<DateRange>,
) -> Vec<SearchResult> {
    match range {
        None => results.into_iter().collect(),
        Some(range) => results
            .into_iter()
            .filter(|result| {
                result
                    .highlighted_at_parsed()
                    .is_some_and(|ts| range.contains(ts))
            })
            .collect(),
    }
}

#[async_trait]
impl SearchBackend for FastPathBackend {
    #[instrument(skip_all, fields(k = query.k))]
    async fn search(
        &self,
        embedding: Vec<f32>,
        query: &SearchQuery,
    ) -> HighlightResult<ResultStream> {
        let pool = self.db.get_raw_pool().await?;
        let vector = Vector::from(embedding);

        let rows = with_retry(
            || {
                let mut qb = build_search_query(vector.clone(), query);
                let pool = pool.clone();
                async move {
                    qb.build_query_as::<ScoredHighlight>()
                        .fetch_all(&pool)
                        .await
                }
            },
            RETRY_ATTEMPTS,
        )
        .await?;

        let fetched = rows.len();
        let results = retain_in_date_range(
            rows.into_iter().map(SearchResult::from),
            query.highlighted_at_range,
        );
        debug!(fetched, returned = results.len(), "Fast-path search complete");

        Ok(futures::stream::iter(results.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl UpsertBackend for FastPathBackend {
    #[instrument(skip_all, fields(count = highlights.len()))]
    async fn upsert(&self, highlights: &[Highlight]) -> HighlightResult<usize> {
        if highlights.is_empty() {
            return Ok(0);
        }

        let pool = self.db.get_raw_pool().await?;
        let pause_between_batches = self.db.deployment().use_fast_path();
        let mut total = 0;

        let mut batches = highlights.chunks(self.batch_size).peekable();
        while let Some(batch) = batches.next() {
            with_retry(
                || {
                    let mut qb = build_upsert_query(batch);
                    let pool = pool.clone();
                    async move { qb.build().execute(&pool).await }
                },
                RETRY_ATTEMPTS,
            )
            .await?;

            total += batch.len();
            info!(batch = batch.len(), total, "Upserted batch of highlights");

            if pause_between_batches && batches.peek().is_some() {
                tokio::time::sleep(INTER_BATCH_PAUSE).await;
            }
        }

        Ok(total)
    }
}

#[async_trait]
impl SyncStateStore for FastPathBackend {
    async fn get_last_sync(&self, service: &str) -> HighlightResult<Option<DateTime<Utc>>> {
        let pool = self.db.get_raw_pool().await?;
        let last = with_retry(
            || {
                sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                    "SELECT last_synced_at FROM sync_state WHERE service = $1",
                )
                .bind(service)
                .fetch_optional(&pool)
            },
            RETRY_ATTEMPTS,
        )
        .await?;
        Ok(last.flatten())
    }

    async fn record_sync_completed(&self, service: &str) -> HighlightResult<()> {
        let pool = self.db.get_raw_pool().await?;
        let now = Utc::now();
        with_retry(
            || {
                sqlx::query(
                    "INSERT INTO sync_state (service, last_synced_at) VALUES ($1, $2) \
                     ON CONFLICT (service) DO UPDATE SET last_synced_at = EXCLUDED.last_synced_at",
                )
                .bind(service)
                .bind(now)
                .execute(&pool)
            },
            RETRY_ATTEMPTS,
        )
        .await?;
        info!(service, "Recorded sync completion");
        Ok(())
    }
}
