//! SearchSink trait definition.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::{IndexMapping, SinkError};

/// A document ready to be upserted.
///
/// The identifier is the source row's primary key, so writing the same row
/// twice replaces the document instead of duplicating it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub source: Map<String, Value>,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>, source: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// One document the engine refused inside an otherwise accepted bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

impl BulkItemFailure {
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Result of a bulk request that reached the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    /// Number of documents written
    pub succeeded: usize,
    /// Documents the engine rejected individually
    pub failures: Vec<BulkItemFailure>,
    /// Engine-side processing time, when reported
    pub took: Option<Duration>,
}

impl BulkOutcome {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            succeeded: count,
            ..Default::default()
        }
    }

    pub fn rate_limited(&self) -> bool {
        self.failures.iter().any(BulkItemFailure::is_rate_limited)
    }
}

/// Trait for writing documents to a search index.
///
/// # Usage Pattern
///
/// The sync engine is generic over the sink:
///
/// ```ignore
/// pub async fn run_cycle<S: SearchSink>(sink: &S, docs: &[IndexDocument]) -> anyhow::Result<()> {
///     let outcome = sink.bulk_upsert("orders", docs).await?;
///     // ...
/// }
/// ```
#[async_trait::async_trait]
pub trait SearchSink: Send + Sync {
    /// Create the index with the given mapping, or extend the mapping of an
    /// existing index.
    async fn ensure_index(&self, index: &str, mapping: &IndexMapping) -> Result<(), SinkError>;

    /// Upsert a batch of documents keyed by their identifiers.
    ///
    /// Returns `Err` only when the request as a whole failed; per-document
    /// rejections are reported in [`BulkOutcome::failures`].
    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkOutcome, SinkError>;
}

#[async_trait::async_trait]
impl<T: SearchSink + ?Sized> SearchSink for std::sync::Arc<T> {
    async fn ensure_index(&self, index: &str, mapping: &IndexMapping) -> Result<(), SinkError> {
        (**self).ensure_index(index, mapping).await
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkOutcome, SinkError> {
        (**self).bulk_upsert(index, documents).await
    }
}
