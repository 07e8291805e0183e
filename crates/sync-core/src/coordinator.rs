//! Per-table sync loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use search_sink::SearchSink;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use watermark::{Advance, Watermark, WatermarkStore};

use crate::backoff::RetryPolicy;
use crate::batch::{BatchFeedback, BatchSizeConfig, SizeChange};
use crate::indexer::{BulkIndexer, IndexError};
use crate::reader::BatchReader;
use crate::source::{ChangeBatch, ChangeSource, TableSpec};

/// Where a coordinator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    ReadWatermark,
    ReadBatch,
    Index,
    AdvanceWatermark,
    Sleeping,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::ReadWatermark => "read-watermark",
            SyncState::ReadBatch => "read-batch",
            SyncState::Index => "index",
            SyncState::AdvanceWatermark => "advance-watermark",
            SyncState::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    pub batch: BatchSizeConfig,
    /// Retries of a batch whose indexing failed
    pub batch_retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch: BatchSizeConfig::default(),
            batch_retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub table: String,
    pub rows: usize,
    pub batches: usize,
    /// New watermark, if the cycle advanced it
    pub advanced_to: Option<DateTime<Utc>>,
    /// Shutdown stopped the cycle before the range was drained
    pub interrupted: bool,
}

impl CycleReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            rows: 0,
            batches: 0,
            advanced_to: None,
            interrupted: false,
        }
    }
}

/// Syncs one table. Exactly one coordinator may exist per table.
pub struct SyncCoordinator<C, S, W> {
    reader: BatchReader<C>,
    indexer: Arc<BulkIndexer<S>>,
    watermarks: Arc<W>,
    config: CoordinatorConfig,
    state: SyncState,
    index_ready: bool,
}

impl<C, S, W> SyncCoordinator<C, S, W>
where
    C: ChangeSource,
    S: SearchSink,
    W: WatermarkStore,
{
    pub fn new(
        table: TableSpec,
        source: Arc<C>,
        indexer: Arc<BulkIndexer<S>>,
        watermarks: Arc<W>,
        config: CoordinatorConfig,
    ) -> Self {
        let reader = BatchReader::new(source, table, config.batch.clone());
        Self {
            reader,
            indexer,
            watermarks,
            config,
            state: SyncState::Idle,
            index_ready: false,
        }
    }

    pub fn table(&self) -> &TableSpec {
        self.reader.table()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn batch_size(&self) -> usize {
        self.reader.batch_size()
    }

    /// Run one cycle: read the watermark, drain the changed range batch by
    /// batch, then advance the watermark.
    ///
    /// Any error leaves the watermark where it was. When `shutdown` fires the
    /// in-flight batch is finished and the cycle ends without advancing.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let result = self.cycle(shutdown).await;
        self.state = SyncState::Idle;
        result
    }

    async fn cycle(&mut self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let table = self.reader.table().clone();
        let mut report = CycleReport::new(&table.name);

        self.ensure_index(&table).await?;

        self.state = SyncState::ReadWatermark;
        let current = self
            .watermarks
            .read(&table.name)
            .await
            .with_context(|| format!("Failed to read watermark for {}", table.name))?;
        let after = Watermark::last_sync_time_or_initial(current.as_ref());
        let until = self
            .reader
            .source()
            .current_time()
            .await
            .context("Failed to read the source clock")?;

        if until < after {
            warn!(
                "Source clock {} is behind the watermark {} of {}, skipping cycle",
                until, after, table.name
            );
            return Ok(report);
        }

        debug!("Syncing {} changes in ({after}, {until}]", table.name);
        self.reader.begin(after, until);

        loop {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            self.state = SyncState::ReadBatch;
            let Some(batch) = self.reader.next_batch().await? else {
                break;
            };

            self.state = SyncState::Index;
            let Some(feedback) = self.index_with_retry(&table, &batch, shutdown).await? else {
                report.interrupted = true;
                break;
            };

            report.rows += batch.len();
            report.batches += 1;
            match self.reader.record(feedback) {
                SizeChange::Grew { from, to } => {
                    debug!("Batch size for {} grew from {from} to {to}", table.name)
                }
                SizeChange::Shrank { from, to } => {
                    info!("Batch size for {} shrank from {from} to {to}", table.name)
                }
                SizeChange::Held(_) => {}
            }
        }

        if report.interrupted {
            info!(
                "Shutdown requested, stopping {} after {} rows without advancing the watermark",
                table.name, report.rows
            );
            return Ok(report);
        }

        let Some(max_seen) = self.reader.max_seen() else {
            debug!("No changes for {} since {after}", table.name);
            return Ok(report);
        };

        if self.indexer.dry_run() {
            info!(
                "Dry-run: {} rows of {} read, watermark would advance to {max_seen}",
                report.rows, table.name
            );
            return Ok(report);
        }

        self.state = SyncState::AdvanceWatermark;
        let advance = self
            .watermarks
            .advance(&table.name, max_seen)
            .await
            .with_context(|| format!("Failed to advance watermark for {}", table.name))?;
        if let Advance::Rejected { current } = advance {
            bail!(
                "Watermark for {} is already at {current}, refusing to move it back to {max_seen}; is another sync running for this table?",
                table.name
            );
        }
        report.advanced_to = Some(max_seen);

        Ok(report)
    }

    async fn ensure_index(&mut self, table: &TableSpec) -> Result<()> {
        if self.index_ready {
            return Ok(());
        }
        let mapping = self
            .reader
            .source()
            .index_mapping(table)
            .await
            .with_context(|| format!("Failed to read the schema of {}", table.name))?;
        self.indexer
            .ensure_index(&table.index_name, &mapping)
            .await
            .with_context(|| format!("Failed to prepare index {}", table.index_name))?;
        info!(
            "Index {} ready for {} ({} fields)",
            table.index_name,
            table.name,
            mapping.properties.len()
        );
        self.index_ready = true;
        Ok(())
    }

    /// Index one batch, retrying the whole batch with backoff.
    ///
    /// Returns `None` if shutdown fired while waiting for a retry.
    async fn index_with_retry(
        &mut self,
        table: &TableSpec,
        batch: &ChangeBatch,
        shutdown: &CancellationToken,
    ) -> Result<Option<BatchFeedback>> {
        let policy = self.config.batch_retry.clone();
        let mut retry = 0;

        loop {
            let err = match self.indexer.index_batch(&table.index_name, batch).await {
                Ok(report) => {
                    debug!(
                        "Indexed {} documents into {} in {:?}",
                        report.indexed, table.index_name, report.latency
                    );
                    return Ok(Some(report.feedback()));
                }
                Err(err) => err,
            };

            if err.rate_limited() {
                self.reader.shrink();
            }
            if matches!(&err, IndexError::Sink(e) if !e.is_transient()) {
                return Err(anyhow!(err).context(format!(
                    "Indexing a batch of {} rows into {} failed",
                    batch.len(),
                    table.index_name
                )));
            }

            retry += 1;
            if retry > policy.max_retries {
                return Err(anyhow!(err).context(format!(
                    "Indexing a batch of {} rows into {} failed after {} retries",
                    batch.len(),
                    table.index_name,
                    policy.max_retries
                )));
            }

            let delay = policy.delay_for(retry);
            warn!(
                "Indexing batch for {} failed (retry {retry}/{}): {err}. Retrying in {delay:?}",
                table.name, policy.max_retries
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Ok(None),
            }
        }
    }

    /// Run cycles until `shutdown` fires, holding a worker permit only while a
    /// cycle runs.
    pub async fn run(mut self, workers: Arc<Semaphore>, shutdown: CancellationToken) -> Result<()> {
        let table = self.reader.table().clone();
        info!(
            "Starting sync of {} into {} every {:?}",
            table.name, table.index_name, self.config.interval
        );

        loop {
            let permit = tokio::select! {
                permit = workers.clone().acquire_owned() => permit.context("Worker pool closed")?,
                _ = shutdown.cancelled() => break,
            };

            match self.run_cycle(&shutdown).await {
                Ok(report) if report.rows > 0 => info!(
                    "Synced {} rows of {} in {} batches",
                    report.rows, table.name, report.batches
                ),
                Ok(_) => debug!("Cycle for {} found no changes", table.name),
                Err(e) => error!("Sync cycle for {} failed: {e:#}", table.name),
            }
            drop(permit);

            self.state = SyncState::Sleeping;
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        self.state = SyncState::Idle;
        info!("Stopped sync of {}", table.name);
        Ok(())
    }
}
