//! Runs one coordinator per table on a bounded worker pool.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use search_sink::SearchSink;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use watermark::WatermarkStore;

use crate::coordinator::{CoordinatorConfig, CycleReport, SyncCoordinator};
use crate::indexer::BulkIndexer;
use crate::source::{ChangeSource, TableSpec};

#[derive(Debug, Clone)]
pub struct SyncRunnerConfig {
    /// Maximum number of tables syncing at the same time
    pub pool_size: usize,
    pub coordinator: CoordinatorConfig,
}

pub struct SyncRunner<C, S, W> {
    coordinators: Vec<SyncCoordinator<C, S, W>>,
    workers: Arc<Semaphore>,
}

impl<C, S, W> SyncRunner<C, S, W>
where
    C: ChangeSource + 'static,
    S: SearchSink + 'static,
    W: WatermarkStore + 'static,
{
    /// Build one coordinator per table.
    ///
    /// Fails if a table appears twice, since two writers would race on the
    /// same watermark.
    pub fn new(
        tables: Vec<TableSpec>,
        source: Arc<C>,
        indexer: Arc<BulkIndexer<S>>,
        watermarks: Arc<W>,
        config: SyncRunnerConfig,
    ) -> Result<Self> {
        if config.pool_size == 0 {
            bail!("pool_size must be at least 1");
        }
        let mut seen = HashSet::new();
        for table in &tables {
            if !seen.insert(table.name.as_str()) {
                bail!("Table {} is configured more than once", table.name);
            }
        }

        let coordinators = tables
            .into_iter()
            .map(|table| {
                SyncCoordinator::new(
                    table,
                    source.clone(),
                    indexer.clone(),
                    watermarks.clone(),
                    config.coordinator.clone(),
                )
            })
            .collect();

        Ok(Self {
            coordinators,
            workers: Arc::new(Semaphore::new(config.pool_size)),
        })
    }

    pub fn tables(&self) -> Vec<&TableSpec> {
        self.coordinators.iter().map(|c| c.table()).collect()
    }

    /// Sync every table until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Syncing {} tables with up to {} at a time",
            self.coordinators.len(),
            self.workers.available_permits()
        );

        let mut tasks = JoinSet::new();
        for coordinator in self.coordinators {
            tasks.spawn(coordinator.run(self.workers.clone(), shutdown.clone()));
        }

        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.context("Sync task panicked") {
                Ok(Ok(())) => {}
                Ok(Err(e)) | Err(e) => {
                    error!("{e:#}");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            bail!("{failed} sync loops stopped with an error");
        }
        Ok(())
    }

    /// Run a single cycle for every table and return the reports in table
    /// order. Fails if any table's cycle failed.
    pub async fn run_once(self, shutdown: CancellationToken) -> Result<Vec<CycleReport>> {
        let mut tasks = JoinSet::new();
        for (position, mut coordinator) in self.coordinators.into_iter().enumerate() {
            let workers = self.workers.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let table = coordinator.table().name.clone();
                let result = match workers.acquire_owned().await {
                    Ok(_permit) => coordinator.run_cycle(&shutdown).await,
                    Err(e) => Err(e.into()),
                };
                (position, table, result)
            });
        }

        let mut reports = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (position, table, result) = joined.context("Sync task panicked")?;
            match result {
                Ok(report) => reports.push((position, report)),
                Err(e) => {
                    error!("Sync cycle for {table} failed: {e:#}");
                    failed.push(table);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            bail!("Sync failed for tables: {}", failed.join(", "));
        }
        reports.sort_by_key(|(position, _)| *position);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}
