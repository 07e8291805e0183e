//! Incremental sync engine for pg-search-sync
//!
//! Moves changed rows from a [`ChangeSource`] into a
//! [`search_sink::SearchSink`] while keeping a per-table watermark in a
//! [`watermark::WatermarkStore`].
//!
//! # Design Overview
//!
//! One [`SyncCoordinator`] owns one table. Each cycle it:
//! 1. reads the table's watermark
//! 2. fixes the cycle's upper bound from the source clock
//! 3. pulls batches ordered by `(updated_at, primary key)` through a
//!    [`BatchReader`] whose size adapts to indexing pressure
//! 4. upserts every batch through the [`BulkIndexer`], retrying with backoff
//! 5. advances the watermark to the newest `updated_at` once the range is drained
//!
//! A failed batch aborts the cycle before step 5, so the same rows are read
//! again on the next cycle. Documents are keyed by primary key, which makes
//! the replay harmless.
//!
//! [`SyncRunner`] runs one coordinator per table on a bounded worker pool.

pub mod backoff;
pub mod batch;
pub mod coordinator;
pub mod indexer;
pub mod rate_limit;
pub mod reader;
pub mod runner;
pub mod source;

#[cfg(test)]
mod testing;

pub use backoff::RetryPolicy;
pub use batch::{BatchFeedback, BatchSizeConfig, BatchSizer, SizeChange};
pub use coordinator::{CoordinatorConfig, CycleReport, SyncCoordinator, SyncState};
pub use indexer::{BulkIndexer, IndexError, IndexReport, IndexerConfig};
pub use rate_limit::{RateLimitConfig, TokenBucket};
pub use reader::BatchReader;
pub use runner::{SyncRunner, SyncRunnerConfig};
pub use source::{ChangeBatch, ChangeRange, ChangeSource, Position, SourceRow, TableSpec};
