use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database::postgres::DbManager;
use futures::StreamExt;
use sea_orm::ActiveValue::Set;
use sea_orm::prelude::PgVector;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select};
use tracing::{info, instrument};

use super::{ResultStream, SearchBackend, SyncStateStore, UpsertBackend};
use crate::entity::{highlight, sync_state};
use crate::error::HighlightResult;
use crate::models::{Highlight, ScoredHighlight, SearchQuery, SearchResult};

/// SeaORM backend for the local long-lived deployment.
///
/// Unlike the fast path, the `highlighted_at` range is pushed into the query
/// as a `BETWEEN`, upserts go out as one statement for the whole input, and
/// nothing is retry-wrapped.
pub struct OrmBackend {
    db: Arc<DbManager>,
}

impl OrmBackend {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

pub(crate) fn build_search_select(
    embedding: PgVector,
    query: &SearchQuery,
) -> Select<highlight::Entity> {
    use highlight::Column;

    let mut select = highlight::Entity::find().select_only().columns([
        Column::Id,
        Column::Text,
        Column::SourceType,
        Column::SourceId,
        Column::SourceAuthor,
        Column::SourceTitle,
        Column::SourceUrl,
        Column::HighlightedAt,
        Column::UpdatedAt,
        Column::Tags,
    ]);

    select = if query.include_embedding {
        select.column(Column::Embedding)
    } else {
        select.column_as(Expr::cust("NULL::vector"), "embedding")
    };

    select = select
        .column_as(
            Expr::cust_with_values("(embedding <=> $1)::float8", [embedding]),
            "score",
        )
        .filter(Column::Embedding.is_not_null());

    if let Some(source_type) = &query.source_type {
        select = select.filter(Column::SourceType.eq(source_type.as_str()));
    }
    if let Some(author) = &query.author {
        select = select.filter(Column::SourceAuthor.eq(author.as_str()));
    }
    if let Some(tags) = query.tags.as_ref().filter(|tags| !tags.is_empty()) {
        select = select.filter(Expr::cust_with_values("tags && $1", [tags.clone()]));
    }
    if let Some(range) = query.highlighted_at_range {
        let (start, end) = range.bounds();
        select = select.filter(Column::HighlightedAt.between(start, end));
    }

    select
        .order_by_asc(Expr::cust("score"))
        .limit(query.k as u64)
}

#[async_trait]
impl SearchBackend for OrmBackend {
    #[instrument(skip_all, fields(k = query.k))]
    async fn search(
        &self,
        embedding: Vec<f32>,
        query: &SearchQuery,
    ) -> HighlightResult<ResultStream> {
        let db = self.db.get_query_handle().await?;
        let select = build_search_select(PgVector::from(embedding), query);

        let stream = try_stream! {
            let mut rows = select.into_model::<ScoredHighlight>().stream(&db).await?;
            while let Some(row) = rows.next().await {
                yield SearchResult::from(row?);
            }
        };

        Ok(stream.boxed())
    }
}

#[async_trait]
impl UpsertBackend for OrmBackend {
    #[instrument(skip_all, fields(count = highlights.len()))]
    async fn upsert(&self, highlights: &[Highlight]) -> HighlightResult<usize> {
        if highlights.is_empty() {
            return Ok(0);
        }

        let db = self.db.get_query_handle().await?;
        let models = highlights.iter().map(highlight::ActiveModel::from);

        highlight::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(highlight::Column::Id)
                    .update_columns(highlight::MUTABLE_COLUMNS)
                    .to_owned(),
            )
            .exec(&db)
            .await?;

        info!(count = highlights.len(), "Upserted highlights");
        Ok(highlights.len())
    }
}

#[async_trait]
impl SyncStateStore for OrmBackend {
    async fn get_last_sync(&self, service: &str) -> HighlightResult<Option<DateTime<Utc>>> {
        let db = self.db.get_query_handle().await?;
        let state = sync_state::Entity::find_by_id(service.to_string())
            .one(&db)
            .await?;
        Ok(state.and_then(|model| model.last_synced_at))
    }

    async fn record_sync_completed(&self, service: &str) -> HighlightResult<()> {
        let db = self.db.get_query_handle().await?;
        let model = sync_state::ActiveModel {
            service: Set(service.to_string()),
            last_synced_at: Set(Some(Utc::now())),
        };

        sync_state::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sync_state::Column::Service)
                    .update_column(sync_state::Column::LastSyncedAt)
                    .to_owned(),
            )
            .exec(&db)
            .await?;

        info!(service, "Recorded sync completion");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use chrono::NaiveDate;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql(query: &SearchQuery) -> String {
        build_search_select(PgVector::from(vec![0.0; 3]), query)
            .build(DbBackend::Postgres)
            .sql
    }

    #[test]
    fn test_select_without_filters() {
        let sql = sql(&SearchQuery::new("q").with_k(5));

        assert!(sql.contains("\"embedding\" IS NOT NULL"));
        assert!(sql.contains("NULL::vector AS \"embedding\""));
        assert!(sql.contains("(embedding <=> $1)::float8 AS \"score\""));
        assert!(sql.contains("ORDER BY score ASC"));
        assert!(sql.contains("LIMIT $2"));
        assert!(!sql.contains("\"source_type\" ="));
        assert!(!sql.contains("tags &&"));
        assert!(!sql.contains("BETWEEN"));
    }

    #[test]
    fn test_select_pushes_every_filter_down() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        );
        let query = SearchQuery::new("q")
            .with_source_type("article")
            .with_author("Ada")
            .with_tags(vec!["rust".to_string(), "db".to_string()])
            .with_date_range(range);
        let sql = sql(&query);

        assert!(sql.contains("\"source_type\" = $2"));
        assert!(sql.contains("\"source_author\" = $3"));
        assert!(sql.contains("tags && $4"));
        assert!(sql.contains("\"highlighted_at\" BETWEEN $5 AND $6"));
        assert!(sql.contains("LIMIT $7"));
    }

    #[test]
    fn test_include_embedding_selects_stored_vector() {
        let mut query = SearchQuery::new("q");
        query.include_embedding = true;
        let sql = sql(&query);

        assert!(!sql.contains("NULL::vector"));
        assert!(sql.contains("\"highlight\".\"embedding\""));
    }
}
