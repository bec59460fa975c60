//! Sync and search counters recorded through the `metrics` facade.
//!
//! Nothing is exported from here; the API binary installs a Prometheus
//! recorder and serves it at `/metrics`. Without a recorder every call is a
//! no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const ROWS_SYNCED_TOTAL: &str = "rows_synced_total";
pub const ERROR_RATE: &str = "error_rate";
pub const SYNC_DURATION_SECONDS: &str = "sync_duration_seconds";

/// Where an error counted in [`ERROR_RATE`] happened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorSource {
    Sync,
    Search,
    Stream,
}

impl ErrorSource {
    fn as_str(self) -> &'static str {
        match self {
            ErrorSource::Sync => "sync",
            ErrorSource::Search => "search",
            ErrorSource::Stream => "stream",
        }
    }
}

/// Describe and register every metric so a scrape lists them before the
/// first sync.
pub fn describe_metrics() {
    describe_counter!(ROWS_SYNCED_TOTAL, "Total rows synced by the sync service");
    describe_counter!(ERROR_RATE, "Total sync errors encountered");
    describe_histogram!(SYNC_DURATION_SECONDS, "Sync duration in seconds");

    counter!(ROWS_SYNCED_TOTAL).increment(0);
    counter!(ERROR_RATE).increment(0);
    histogram!(SYNC_DURATION_SECONDS);
}

pub fn record_rows_synced(rows: usize) {
    counter!(ROWS_SYNCED_TOTAL).increment(rows as u64);
}

pub fn record_error(source: ErrorSource) {
    counter!(ERROR_RATE, "source" => source.as_str()).increment(1);
}

/// `mode` is `backfill` or `incremental`
pub fn record_sync_duration(mode: &'static str, elapsed: Duration) {
    histogram!(SYNC_DURATION_SECONDS, "mode" => mode).record(elapsed.as_secs_f64());
}
