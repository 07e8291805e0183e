//! Change source abstraction.
//!
//! A change source returns rows of one table whose timestamp column falls in
//! a half-open range, in `(updated_at, primary key)` order, so that a batch
//! boundary can always be resumed from the last row of the previous batch.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use search_sink::{IndexDocument, IndexMapping};
use serde_json::{Map, Value};

/// Configuration for syncing one source table into one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Source table name (optionally schema-qualified)
    pub name: String,
    /// Target index name
    pub index_name: String,
    /// Column holding the row's last-modified time
    pub timestamp_column: String,
    /// Column holding the row's primary key
    pub primary_key: String,
}

/// Position of a row in the `(updated_at, primary key)` total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub updated_at: DateTime<Utc>,
    /// Primary key rendered as text; also the document identifier
    pub key: String,
}

/// One changed source row, already converted to a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub position: Position,
    pub fields: Map<String, Value>,
}

impl SourceRow {
    /// Build the document to upsert. The identifier is fixed to the primary key.
    pub fn to_document(&self) -> IndexDocument {
        IndexDocument::new(self.position.key.clone(), self.fields.clone())
    }
}

/// Range of changes one sync cycle covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRange {
    /// Exclusive lower bound (the table's watermark)
    pub after: DateTime<Utc>,
    /// Inclusive upper bound, fixed when the cycle starts
    pub until: DateTime<Utc>,
    /// Resume strictly after this row, if a batch was already read
    pub resume: Option<Position>,
}

/// An ordered batch of changed rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub rows: Vec<SourceRow>,
}

impl ChangeBatch {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the last row; rows are ordered so it is also the greatest.
    pub fn last_position(&self) -> Option<&Position> {
        self.rows.last().map(|r| &r.position)
    }

    pub fn max_updated_at(&self) -> Option<DateTime<Utc>> {
        self.rows.iter().map(|r| r.position.updated_at).max()
    }

    pub fn documents(&self) -> Vec<IndexDocument> {
        self.rows.iter().map(SourceRow::to_document).collect()
    }
}

/// Trait for reading changed rows from a relational store.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Current time according to the source, used as a cycle's upper bound.
    async fn current_time(&self) -> Result<DateTime<Utc>>;

    /// Derive the index mapping for a table from its column types.
    async fn index_mapping(&self, table: &TableSpec) -> Result<IndexMapping>;

    /// Fetch at most `limit` rows in `range`, ordered by `(updated_at, key)`.
    async fn fetch_changes(
        &self,
        table: &TableSpec,
        range: &ChangeRange,
        limit: usize,
    ) -> Result<Vec<SourceRow>>;
}
