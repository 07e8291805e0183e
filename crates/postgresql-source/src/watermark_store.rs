//! Watermarks stored in the source database.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use watermark::{Advance, Watermark, WatermarkStore};

use crate::ident::quote_qualified;
use crate::pool::PgPool;

/// [`WatermarkStore`] over a `sync_status`-shaped table.
///
/// The advance is a single conditional upsert, so two writers can never move
/// a watermark backwards even if the single-writer rule is broken.
pub struct PostgresWatermarkStore {
    pool: PgPool,
    relation: String,
}

impl PostgresWatermarkStore {
    pub fn new(pool: PgPool, table_name: &str) -> Result<Self> {
        Ok(Self {
            pool,
            relation: quote_qualified(table_name)?,
        })
    }

    /// Create the watermark table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .batch_execute(&create_table_sql(&self.relation))
            .await
            .with_context(|| format!("Failed to create watermark table {}", self.relation))?;
        info!("Watermark table {} ready", self.relation);
        Ok(())
    }

    /// Whether the watermark table exists. Reads only.
    pub async fn table_exists(&self) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[&self.relation])
            .await
            .with_context(|| format!("Failed to look up watermark table {}", self.relation))?;
        Ok(row.get(0))
    }
}

fn create_table_sql(relation: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {relation} (
            table_name TEXT PRIMARY KEY,
            last_sync_time TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
    )
}

fn advance_sql(relation: &str) -> String {
    format!(
        "INSERT INTO {relation} AS s (table_name, last_sync_time, created_at, updated_at)
         VALUES ($1, $2, now(), now())
         ON CONFLICT (table_name) DO UPDATE
            SET last_sync_time = EXCLUDED.last_sync_time, updated_at = now()
            WHERE s.last_sync_time <= EXCLUDED.last_sync_time
         RETURNING (xmax = 0) AS created"
    )
}

fn read_sql(relation: &str) -> String {
    format!(
        "SELECT table_name, last_sync_time, created_at, updated_at FROM {relation} WHERE table_name = $1"
    )
}

#[async_trait]
impl WatermarkStore for PostgresWatermarkStore {
    async fn read(&self, table_name: &str) -> Result<Option<Watermark>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&read_sql(&self.relation), &[&table_name])
            .await
            .with_context(|| format!("Failed to read watermark for {table_name}"))?;

        Ok(row.map(|row| Watermark {
            table_name: row.get(0),
            last_sync_time: row.get(1),
            created_at: row.get(2),
            updated_at: row.get(3),
        }))
    }

    async fn advance(&self, table_name: &str, to: DateTime<Utc>) -> Result<Advance> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&advance_sql(&self.relation), &[&table_name, &to])
            .await
            .with_context(|| format!("Failed to advance watermark for {table_name}"))?;

        if let Some(row) = row {
            let created: bool = row.get(0);
            return Ok(if created {
                Advance::Created
            } else {
                Advance::Advanced
            });
        }

        drop(client);
        match self.read(table_name).await? {
            Some(current) => Ok(Advance::Rejected {
                current: current.last_sync_time,
            }),
            None => bail!("Watermark for {table_name} was neither written nor found"),
        }
    }
}
