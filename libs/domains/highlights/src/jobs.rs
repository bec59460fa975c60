//! Backfill and incremental ingestion
//!
//! Both jobs stream raw highlights from a [`HighlightSource`], embed each one,
//! upsert in fixed-size batches and record sync completion once the last
//! batch is committed. A failed upsert aborts the run before the sync
//! timestamp moves, so the next run replays from the previous point.
//!
//! Every run feeds [`metrics`](crate::metrics): rows per committed batch,
//! wall time per run, and one error count per failed run.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{info, instrument, warn};

use crate::embedding::EmbeddingClient;
use crate::error::HighlightResult;
use crate::metrics::{self, ErrorSource};
use crate::models::{Highlight, READWISE_SERVICE, SyncReport};
use crate::parser::parse_highlight;
use crate::readwise::HighlightSource;
use crate::sync_state::SyncStateTracker;
use crate::upsert::UpsertEngine;

/// Highlights per upsert call
pub const BATCH_SIZE: usize = 100;

#[derive(Clone, Copy, Debug)]
enum EmbedInput {
    /// Highlight text only
    Text,
    /// Highlight text followed by the reader's note
    TextWithNote,
}

impl EmbedInput {
    fn mode(self) -> &'static str {
        match self {
            EmbedInput::Text => "backfill",
            EmbedInput::TextWithNote => "incremental",
        }
    }
}

pub struct SyncJob {
    source: Arc<dyn HighlightSource>,
    embedder: Arc<EmbeddingClient>,
    upsert: UpsertEngine,
    sync_state: SyncStateTracker,
    batch_size: usize,
}

impl SyncJob {
    pub fn new(
        source: Arc<dyn HighlightSource>,
        embedder: Arc<EmbeddingClient>,
        upsert: UpsertEngine,
        sync_state: SyncStateTracker,
    ) -> Self {
        Self {
            source,
            embedder,
            upsert,
            sync_state,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Full historical import.
    #[instrument(skip(self))]
    pub async fn run_backfill(&self) -> HighlightResult<SyncReport> {
        info!("Starting backfill");
        let processed = self.ingest(None, EmbedInput::Text).await?;
        info!(processed, "Backfill complete");
        Ok(SyncReport {
            processed,
            ran: true,
        })
    }

    /// Import highlights updated after `since`, or after the last recorded
    /// sync when `since` is `None`.
    ///
    /// With neither available nothing is fetched and the report has
    /// `ran == false`; a backfill has to come first.
    #[instrument(skip(self))]
    pub async fn run_incremental(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> HighlightResult<SyncReport> {
        let since = match since {
            Some(since) => since,
            None => match self.sync_state.get_last_sync(READWISE_SERVICE).await? {
                Some(last) => {
                    info!(since = %last, "Syncing since last recorded sync");
                    last
                }
                None => {
                    warn!("No last sync state found; run a backfill first or pass a start time");
                    return Ok(SyncReport::default());
                }
            },
        };

        info!(since = %since, "Starting incremental sync");
        let processed = self.ingest(Some(since), EmbedInput::TextWithNote).await?;
        info!(processed, "Incremental sync complete");
        Ok(SyncReport {
            processed,
            ran: true,
        })
    }

    async fn ingest(
        &self,
        updated_after: Option<DateTime<Utc>>,
        input: EmbedInput,
    ) -> HighlightResult<usize> {
        let started = Instant::now();
        let outcome = self.ingest_batches(updated_after, input).await;
        metrics::record_sync_duration(input.mode(), started.elapsed());
        if outcome.is_err() {
            metrics::record_error(ErrorSource::Sync);
        }
        outcome
    }

    async fn ingest_batches(
        &self,
        updated_after: Option<DateTime<Utc>>,
        input: EmbedInput,
    ) -> HighlightResult<usize> {
        let mut raw_highlights = self.source.export(updated_after);
        let mut batch: Vec<Highlight> = Vec::with_capacity(self.batch_size);
        let mut processed = 0;

        while let Some(raw) = raw_highlights.next().await {
            let mut highlight = match parse_highlight(raw?) {
                Ok(highlight) => highlight,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed highlight");
                    continue;
                }
            };

            let text = match input {
                EmbedInput::Text => highlight.text.clone(),
                EmbedInput::TextWithNote => highlight.embedding_input(),
            };
            highlight.embedding = Some(self.embedder.embed(&text).await?);
            batch.push(highlight);

            if batch.len() >= self.batch_size {
                processed += self.commit(&batch).await?;
                info!(batch = batch.len(), total = processed, "Upserted batch");
                batch.clear();
            }
        }

        if !batch.is_empty() {
            processed += self.commit(&batch).await?;
            info!(batch = batch.len(), total = processed, "Upserted final batch");
        }

        self.sync_state
            .record_sync_completed(READWISE_SERVICE)
            .await?;
        Ok(processed)
    }

    async fn commit(&self, batch: &[Highlight]) -> HighlightResult<usize> {
        let written = self.upsert.upsert(batch).await?;
        metrics::record_rows_synced(written);
        Ok(written)
    }
}
