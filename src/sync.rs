//! The `sync` command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pg_search_sync_postgresql_source::{
    connect_with_retries, PgPool, PostgresChangeSource, PostgresWatermarkStore,
};
use sync_core::{BulkIndexer, RetryPolicy, SyncRunner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watermark::{FilesystemStore, MemoryStore, WatermarkStorage, WatermarkStore};

use crate::config::SyncConfig;
use crate::{SearchOpts, SourceOpts};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Run one cycle per table and exit
    pub once: bool,
    pub dry_run: bool,
    pub watermarks: WatermarkStorage,
}

/// Connection attempts at startup: 3 retries, waiting 2s, 4s, 8s.
pub fn startup_retry_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(30))
}

pub async fn run_sync(
    source: &SourceOpts,
    search: &SearchOpts,
    config: SyncConfig,
    options: SyncOptions,
    shutdown: CancellationToken,
) -> Result<()> {
    let policy = startup_retry_policy();
    let pool = connect_with_retries(&source.to_config(), &policy).await?;
    let client = elasticsearch_sink::connect_with_retries(&search.to_config()?, &policy).await?;

    let watermarks = open_watermarks(&options.watermarks, &pool, options.dry_run).await?;
    let indexer = Arc::new(BulkIndexer::new(
        client,
        config.indexer_config(options.dry_run),
    ));
    let runner = SyncRunner::new(
        config.table_specs(),
        Arc::new(PostgresChangeSource::new(pool)),
        indexer,
        Arc::new(watermarks),
        config.runner_config(),
    )?;

    if options.dry_run {
        warn!("Dry run: documents are converted but not written, watermarks stay put");
    }
    info!(
        "Syncing {} table(s) with {} worker(s)",
        config.tables.len(),
        config.pool_size
    );

    if options.once {
        let reports = runner.run_once(shutdown).await?;
        for report in reports {
            match report.advanced_to {
                Some(to) => info!(
                    "{}: {} rows in {} batches, watermark now {to}",
                    report.table, report.rows, report.batches
                ),
                None => info!("{}: {} rows, watermark unchanged", report.table, report.rows),
            }
        }
        Ok(())
    } else {
        runner.run(shutdown).await
    }
}

/// What to do with the PostgreSQL watermark table before syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatermarkTable {
    /// Create it if needed
    Create,
    /// Read it, never write it
    ReadOnly,
    /// A dry run without a table: every table starts from the beginning
    Absent,
}

impl WatermarkTable {
    fn plan(dry_run: bool, exists: bool) -> Self {
        match (dry_run, exists) {
            (false, _) => WatermarkTable::Create,
            (true, true) => WatermarkTable::ReadOnly,
            (true, false) => WatermarkTable::Absent,
        }
    }
}

async fn open_watermarks(
    storage: &WatermarkStorage,
    pool: &PgPool,
    dry_run: bool,
) -> Result<Arc<dyn WatermarkStore>> {
    let store: Arc<dyn WatermarkStore> = match storage {
        WatermarkStorage::Memory => {
            warn!("Watermarks are kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
        WatermarkStorage::Filesystem { dir } => {
            info!("Keeping watermarks in {dir}");
            Arc::new(FilesystemStore::new(dir.clone()))
        }
        WatermarkStorage::Postgres { table_name } => {
            let store = PostgresWatermarkStore::new(pool.clone(), table_name)
                .context("Invalid watermark table")?;
            let exists = dry_run && store.table_exists().await?;
            match WatermarkTable::plan(dry_run, exists) {
                WatermarkTable::Create => {
                    store.ensure_table().await?;
                    Arc::new(store)
                }
                WatermarkTable::ReadOnly => Arc::new(store),
                WatermarkTable::Absent => {
                    info!("Dry run: watermark table {table_name} does not exist, reading every table from the start");
                    Arc::new(MemoryStore::new())
                }
            }
        }
    };
    Ok(store)
}

/// A token cancelled on Ctrl+C.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal (Ctrl+C), finishing in-flight batches");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {e}"),
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_never_creates_the_watermark_table() {
        assert_eq!(WatermarkTable::plan(false, false), WatermarkTable::Create);
        assert_eq!(WatermarkTable::plan(false, true), WatermarkTable::Create);
        assert_eq!(WatermarkTable::plan(true, true), WatermarkTable::ReadOnly);
        assert_eq!(WatermarkTable::plan(true, false), WatermarkTable::Absent);
    }
}
