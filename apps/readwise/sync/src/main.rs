//! Readwise Sync
//!
//! Pulls highlights from the Readwise export API, embeds them and upserts
//! them into the highlight store. `reader` dumps Reader documents as JSON
//! lines without touching the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_highlights::parser::parse_iso_datetime;
use domain_highlights::{AppContext, ReadwiseClient, SyncReport};
use eyre::{Result, WrapErr};
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, stdout};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "readwise-sync")]
#[command(about = "Ingest Readwise highlights into the search store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a sync. Without flags, syncs everything updated since the last run.
    Sync(SyncArgs),
    /// Print Reader documents to stdout, one JSON object per line
    Reader(ReaderArgs),
}

#[derive(Debug, Args)]
struct ReaderArgs {
    /// Only documents updated after this ISO-8601 timestamp
    #[arg(long, value_parser = parse_since)]
    since: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Import the full export history
    #[arg(long, conflicts_with = "since")]
    backfill: bool,

    /// Import highlights updated after this ISO-8601 timestamp
    #[arg(long, value_parser = parse_since)]
    since: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq)]
enum SyncMode {
    Backfill,
    Incremental(Option<DateTime<Utc>>),
}

impl SyncArgs {
    fn mode(&self) -> SyncMode {
        if self.backfill {
            SyncMode::Backfill
        } else {
            SyncMode::Incremental(self.since)
        }
    }
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    parse_iso_datetime(Some(value)).ok_or_else(|| format!("invalid ISO-8601 timestamp: {value}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    init_tracing(&Environment::from_env());

    match cli.command {
        Commands::Sync(args) => sync(args).await,
        Commands::Reader(args) => dump_reader(args).await,
    }
}

async fn sync(args: SyncArgs) -> Result<()> {
    let ctx = AppContext::from_env()?;
    let source = Arc::new(ReadwiseClient::from_env()?);
    let job = ctx.sync_job(source).await.wrap_err("Failed to prepare sync job")?;

    let outcome = match args.mode() {
        SyncMode::Backfill => job.run_backfill().await,
        SyncMode::Incremental(since) => job.run_incremental(since).await,
    };

    ctx.shutdown().await;
    report(outcome.wrap_err("Sync failed")?);
    Ok(())
}

async fn dump_reader(args: ReaderArgs) -> Result<()> {
    let client = ReadwiseClient::from_env()?;
    let mut documents = client.reader_list(args.since);
    let mut out = stdout();
    let mut count = 0usize;

    while let Some(document) = documents.next().await {
        let mut line = serde_json::to_vec(&document.wrap_err("Reader listing failed")?)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        count += 1;
    }
    out.flush().await?;

    info!(count, "Reader listing finished");
    Ok(())
}

fn report(report: SyncReport) {
    if report.ran {
        info!(processed = report.processed, "Sync finished");
    } else {
        warn!("Nothing synced: run with --backfill or pass --since");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> Result<SyncMode, clap::Error> {
        match Cli::try_parse_from(args)?.command {
            Commands::Sync(args) => Ok(args.mode()),
            Commands::Reader(_) => panic!("expected the sync subcommand"),
        }
    }

    #[test]
    fn test_no_flag_is_incremental_from_last_sync() {
        assert_eq!(
            parse(&["readwise-sync", "sync"]).unwrap(),
            SyncMode::Incremental(None)
        );
    }

    #[test]
    fn test_backfill() {
        assert_eq!(
            parse(&["readwise-sync", "sync", "--backfill"]).unwrap(),
            SyncMode::Backfill
        );
    }

    #[test]
    fn test_since_accepts_iso_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse(&["readwise-sync", "sync", "--since", "2024-03-01T12:00:00Z"]).unwrap(),
            SyncMode::Incremental(Some(expected))
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse(&["readwise-sync", "sync", "--since", "yesterday"]).is_err());
        assert!(
            parse(&[
                "readwise-sync",
                "sync",
                "--backfill",
                "--since",
                "2024-03-01T12:00:00Z"
            ])
            .is_err()
        );
        assert!(parse(&["readwise-sync"]).is_err());
    }

    #[test]
    fn test_reader_subcommand_takes_optional_since() {
        let cli = Cli::try_parse_from(["readwise-sync", "reader"]).unwrap();
        assert!(matches!(cli.command, Commands::Reader(ReaderArgs { since: None })));

        let cli =
            Cli::try_parse_from(["readwise-sync", "reader", "--since", "2024-03-01T12:00:00Z"])
                .unwrap();
        let Commands::Reader(args) = cli.command else {
            panic!("expected the reader subcommand");
        };
        assert_eq!(args.since, Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));

        assert!(Cli::try_parse_from(["readwise-sync", "reader", "--backfill"]).is_err());
    }
}
