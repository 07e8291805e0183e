//! Watermark storage trait and types

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable "last synced" record for one source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Source table name (unique key)
    pub table_name: String,
    /// Every row with `updated_at <= last_sync_time` has been indexed
    pub last_sync_time: DateTime<Utc>,
    /// When the record was first written
    pub created_at: DateTime<Utc>,
    /// When the record was last advanced
    pub updated_at: DateTime<Utc>,
}

impl Watermark {
    /// Lower bound used for a table that has never been synced.
    pub fn initial_time() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    /// Resolve the lower bound of the next sync cycle.
    pub fn last_sync_time_or_initial(watermark: Option<&Watermark>) -> DateTime<Utc> {
        watermark
            .map(|w| w.last_sync_time)
            .unwrap_or_else(Self::initial_time)
    }
}

/// Outcome of [`WatermarkStore::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// First watermark for the table was written.
    Created,
    /// The watermark moved forward (or was re-written with the same value).
    Advanced,
    /// The stored watermark is newer than the requested one and was kept.
    Rejected {
        /// The value that is still stored
        current: DateTime<Utc>,
    },
}

impl Advance {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Advance::Rejected { .. })
    }
}

/// Trait for watermark storage operations.
///
/// Implementations must make `advance` an atomic read-then-conditional
/// update: a value older than the stored one is never written.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Read the watermark for a table. Returns None if the table was never synced.
    async fn read(&self, table_name: &str) -> Result<Option<Watermark>>;

    /// Move the watermark for a table forward to `to`.
    async fn advance(&self, table_name: &str, to: DateTime<Utc>) -> Result<Advance>;
}

#[async_trait]
impl<T: WatermarkStore + ?Sized> WatermarkStore for std::sync::Arc<T> {
    async fn read(&self, table_name: &str) -> Result<Option<Watermark>> {
        (**self).read(table_name).await
    }

    async fn advance(&self, table_name: &str, to: DateTime<Utc>) -> Result<Advance> {
        (**self).advance(table_name, to).await
    }
}

/// Apply the advance rule to an in-memory record.
///
/// Shared by the backends that cannot push the condition into the storage
/// engine itself.
pub(crate) fn apply_advance(
    existing: Option<&Watermark>,
    table_name: &str,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (Advance, Option<Watermark>) {
    match existing {
        None => (
            Advance::Created,
            Some(Watermark {
                table_name: table_name.to_string(),
                last_sync_time: to,
                created_at: now,
                updated_at: now,
            }),
        ),
        Some(current) if current.last_sync_time > to => (
            Advance::Rejected {
                current: current.last_sync_time,
            },
            None,
        ),
        Some(current) => (
            Advance::Advanced,
            Some(Watermark {
                last_sync_time: to,
                updated_at: now,
                ..current.clone()
            }),
        ),
    }
}
