use std::collections::HashMap;

use tracing::{debug, info, instrument};

use crate::backend::{DualPath, UpsertBackend};
use crate::error::HighlightResult;
use crate::models::Highlight;

/// Idempotent insert-or-update of highlights keyed on `id`
#[derive(Clone)]
pub struct UpsertEngine {
    backends: DualPath<dyn UpsertBackend>,
}

impl UpsertEngine {
    pub fn new(backends: DualPath<dyn UpsertBackend>) -> Self {
        Self { backends }
    }

    /// Write `highlights`, returning how many input records were processed.
    ///
    /// An id repeated within one call keeps only its last occurrence, since a
    /// single `ON CONFLICT DO UPDATE` statement cannot touch a row twice. The
    /// collapsed copies still count as processed.
    #[instrument(skip_all, fields(count = highlights.len(), path = ?self.backends.path()))]
    pub async fn upsert(&self, highlights: &[Highlight]) -> HighlightResult<usize> {
        if highlights.is_empty() {
            info!("No highlights to upsert.");
            return Ok(0);
        }

        let unique = dedupe_by_id(highlights);
        if unique.len() < highlights.len() {
            debug!(
                dropped = highlights.len() - unique.len(),
                "Collapsed repeated highlight ids"
            );
        }

        let written = self.backends.active().upsert(&unique).await?;
        info!(written, processed = highlights.len(), "Upsert complete");
        Ok(highlights.len())
    }
}

/// Last occurrence of each id, in order of those occurrences
fn dedupe_by_id(highlights: &[Highlight]) -> Vec<Highlight> {
    let last_index: HashMap<i64, usize> = highlights
        .iter()
        .enumerate()
        .map(|(idx, h)| (h.id, idx))
        .collect();

    highlights
        .iter()
        .enumerate()
        .filter(|(idx, h)| last_index.get(&h.id) == Some(idx))
        .map(|(_, h)| h.clone())
        .collect()
}
