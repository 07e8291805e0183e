//! Bulk indexing with rate limiting and partial failure handling.

use std::collections::HashSet;
use std::time::Duration;

use search_sink::{BulkItemFailure, IndexDocument, IndexMapping, SearchSink, SinkError};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backoff::RetryPolicy;
use crate::batch::BatchFeedback;
use crate::rate_limit::{RateLimitConfig, TokenBucket};
use crate::source::ChangeBatch;

/// Configuration for the bulk indexer.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Largest share of rejected documents (0.0 - 1.0) that is still retried
    /// document by document instead of failing the batch
    pub error_threshold: f64,
    /// Retry schedule for rejected documents
    pub document_retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    /// Convert and count documents without writing them
    pub dry_run: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            error_threshold: 0.1,
            document_retry: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(5)),
            rate_limit: RateLimitConfig::unlimited(),
            dry_run: false,
        }
    }
}

/// What happened to a batch that was indexed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    /// Documents that needed at least one per-document retry
    pub retried: usize,
    pub rate_limited: bool,
    /// Round-trip time of the first bulk request
    pub latency: Duration,
}

impl IndexReport {
    pub fn feedback(&self) -> BatchFeedback {
        BatchFeedback {
            latency: self.latency,
            rate_limited: self.rate_limited,
            partial_failure: self.retried > 0,
        }
    }
}

/// A batch that must not advance the watermark.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("{failed} of {total} documents rejected, above the {threshold} error threshold: {first_reason}")]
    ErrorRatioExceeded {
        failed: usize,
        total: usize,
        threshold: f64,
        rate_limited: bool,
        first_reason: String,
    },

    #[error("{} documents still rejected after {retries} retries (first: {})", .ids.len(), .ids.first().map(String::as_str).unwrap_or(""))]
    DocumentsFailed {
        ids: Vec<String>,
        retries: u32,
        rate_limited: bool,
    },
}

impl IndexError {
    /// Whether the engine signalled overload while this batch failed.
    pub fn rate_limited(&self) -> bool {
        match self {
            IndexError::Sink(e) => e.is_rate_limited(),
            IndexError::ErrorRatioExceeded { rate_limited, .. }
            | IndexError::DocumentsFailed { rate_limited, .. } => *rate_limited,
        }
    }
}

/// Upserts change batches into a search index.
pub struct BulkIndexer<S> {
    sink: S,
    limiter: TokenBucket,
    config: IndexerConfig,
}

impl<S: SearchSink> BulkIndexer<S> {
    pub fn new(sink: S, config: IndexerConfig) -> Self {
        let limiter = TokenBucket::new(config.rate_limit);
        Self {
            sink,
            limiter,
            config,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    pub async fn ensure_index(&self, index: &str, mapping: &IndexMapping) -> Result<(), SinkError> {
        if self.config.dry_run {
            debug!("Dry-run: would ensure index {index} with {} fields", mapping.properties.len());
            return Ok(());
        }
        self.sink.ensure_index(index, mapping).await
    }

    /// Upsert every row of `batch` into `index`.
    ///
    /// Rejections at or below the error threshold are retried per document;
    /// any document still rejected after the retries fails the batch.
    pub async fn index_batch(
        &self,
        index: &str,
        batch: &ChangeBatch,
    ) -> Result<IndexReport, IndexError> {
        let documents = batch.documents();
        let total = documents.len();

        if self.config.dry_run {
            debug!("Dry-run: would upsert {total} documents into {index}");
            return Ok(IndexReport {
                indexed: total,
                retried: 0,
                rate_limited: false,
                latency: Duration::ZERO,
            });
        }

        self.limiter.acquire(total as u64).await;
        let started = Instant::now();
        let outcome = self.sink.bulk_upsert(index, &documents).await?;
        let latency = started.elapsed();

        if outcome.failures.is_empty() {
            return Ok(IndexReport {
                indexed: total,
                retried: 0,
                rate_limited: false,
                latency,
            });
        }

        let mut rate_limited = outcome.rate_limited();
        let failed = outcome.failures.len();
        let ratio = failed as f64 / total.max(1) as f64;
        if ratio > self.config.error_threshold {
            return Err(IndexError::ErrorRatioExceeded {
                failed,
                total,
                threshold: self.config.error_threshold,
                rate_limited,
                first_reason: first_reason(&outcome.failures),
            });
        }

        warn!(
            "{} of {} documents rejected by {}, retrying them individually: {}",
            failed,
            total,
            index,
            first_reason(&outcome.failures)
        );

        let retried = failed;
        let mut pending = select_failed(&documents, &outcome.failures);
        let policy = &self.config.document_retry;

        for retry in 1..=policy.max_retries {
            tokio::time::sleep(policy.delay_for(retry)).await;
            self.limiter.acquire(pending.len() as u64).await;

            let outcome = self.sink.bulk_upsert(index, &pending).await?;
            rate_limited |= outcome.rate_limited();
            if outcome.failures.is_empty() {
                debug!("Retry {retry} indexed the remaining {} documents", pending.len());
                pending.clear();
                break;
            }
            pending = select_failed(&pending, &outcome.failures);
        }

        if !pending.is_empty() {
            return Err(IndexError::DocumentsFailed {
                ids: pending.into_iter().map(|d| d.id).collect(),
                retries: policy.max_retries,
                rate_limited,
            });
        }

        Ok(IndexReport {
            indexed: total,
            retried,
            rate_limited,
            latency,
        })
    }
}

fn select_failed(documents: &[IndexDocument], failures: &[BulkItemFailure]) -> Vec<IndexDocument> {
    let failed: HashSet<&str> = failures.iter().map(|f| f.id.as_str()).collect();
    documents
        .iter()
        .filter(|d| failed.contains(d.id.as_str()))
        .cloned()
        .collect()
}

fn first_reason(failures: &[BulkItemFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{} (status {}): {}", f.id, f.status, f.reason))
        .unwrap_or_default()
}
