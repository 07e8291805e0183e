//! Keyset batch reader with adaptive batch size.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::batch::{BatchFeedback, BatchSizeConfig, BatchSizer, SizeChange};
use crate::source::{ChangeBatch, ChangeRange, ChangeSource, TableSpec};

/// Reads one cycle's range of changes as a sequence of batches.
///
/// The batch size survives across cycles; the range does not.
pub struct BatchReader<C> {
    source: Arc<C>,
    table: TableSpec,
    sizer: BatchSizer,
    range: Option<ChangeRange>,
    exhausted: bool,
    max_seen: Option<DateTime<Utc>>,
}

impl<C: ChangeSource> BatchReader<C> {
    pub fn new(source: Arc<C>, table: TableSpec, batch: BatchSizeConfig) -> Self {
        Self {
            source,
            table,
            sizer: BatchSizer::new(batch),
            range: None,
            exhausted: true,
            max_seen: None,
        }
    }

    /// Start reading changes in `(after, until]`.
    pub fn begin(&mut self, after: DateTime<Utc>, until: DateTime<Utc>) {
        self.range = Some(ChangeRange {
            after,
            until,
            resume: None,
        });
        self.exhausted = until <= after;
        self.max_seen = None;
    }

    /// Fetch the next batch, or `None` once the range is drained.
    ///
    /// A batch shorter than the requested size marks the range as drained.
    pub async fn next_batch(&mut self) -> Result<Option<ChangeBatch>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(range) = self.range.as_mut() else {
            return Ok(None);
        };

        let limit = self.sizer.current();
        let rows = self
            .source
            .fetch_changes(&self.table, range, limit)
            .await
            .with_context(|| format!("Failed to read changes from {}", self.table.name))?;

        if rows.len() < limit {
            self.exhausted = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }

        let batch = ChangeBatch::new(rows);
        range.resume = batch.last_position().cloned();
        self.max_seen = self.max_seen.max(batch.max_updated_at());

        debug!(
            "Read {} rows from {} (batch size {})",
            batch.len(),
            self.table.name,
            limit
        );
        Ok(Some(batch))
    }

    /// Adjust the batch size after a batch was indexed.
    pub fn record(&mut self, feedback: BatchFeedback) -> SizeChange {
        self.sizer.record(feedback)
    }

    /// Shrink the batch size after a rate-limited attempt.
    pub fn shrink(&mut self) -> SizeChange {
        self.sizer.shrink()
    }

    pub fn batch_size(&self) -> usize {
        self.sizer.current()
    }

    /// Newest `updated_at` among the rows read in this range.
    pub fn max_seen(&self) -> Option<DateTime<Utc>> {
        self.max_seen
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    pub fn source(&self) -> &Arc<C> {
        &self.source
    }
}
