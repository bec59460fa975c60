use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::backend::{DualPath, SyncStateStore};
use crate::error::HighlightResult;

/// Last successful sync per external service.
///
/// Call [`SyncStateTracker::record_sync_completed`] only after the
/// corresponding highlights are committed; a failed upsert must leave the
/// timestamp where it was.
#[derive(Clone)]
pub struct SyncStateTracker {
    backends: DualPath<dyn SyncStateStore>,
}

impl SyncStateTracker {
    pub fn new(backends: DualPath<dyn SyncStateStore>) -> Self {
        Self { backends }
    }

    pub async fn get_last_sync(&self, service: &str) -> HighlightResult<Option<DateTime<Utc>>> {
        self.backends.active().get_last_sync(service).await
    }

    #[instrument(skip(self))]
    pub async fn record_sync_completed(&self, service: &str) -> HighlightResult<()> {
        self.backends.active().record_sync_completed(service).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockSyncStateStore;
    use chrono::TimeZone;
    use core_config::{DatabaseBackend, DeployTarget, DeploymentConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reads_and_records_through_active_store() {
        let synced = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let mut fast = MockSyncStateStore::new();
        fast.expect_get_last_sync()
            .times(1)
            .returning(move |service| {
                assert_eq!(service, "readwise");
                Ok(Some(synced))
            });
        fast.expect_record_sync_completed()
            .times(1)
            .returning(|_| Ok(()));
        let mut orm = MockSyncStateStore::new();
        orm.expect_get_last_sync().never();
        orm.expect_record_sync_completed().never();

        let deployment = DeploymentConfig::new(DeployTarget::Vercel, DatabaseBackend::Supabase);
        let tracker = SyncStateTracker::new(DualPath::new(deployment, Arc::new(fast), Arc::new(orm)));

        assert_eq!(tracker.get_last_sync("readwise").await.unwrap(), Some(synced));
        tracker.record_sync_completed("readwise").await.unwrap();
    }
}
