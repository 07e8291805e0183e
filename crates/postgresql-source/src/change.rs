//! Changed-row reader for one PostgreSQL database.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use search_sink::IndexMapping;
use serde_json::Map;
use sync_core::{ChangeRange, ChangeSource, Position, SourceRow, TableSpec};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

use crate::ident::{quote_qualified, validate_identifier};
use crate::pool::PgPool;
use crate::schema::{index_mapping, read_columns};
use crate::value::{convert_postgres_value, value_or_null};

/// Alias of the row's position columns, stripped from the document.
const SYNC_TS: &str = "__sync_ts";
const SYNC_KEY: &str = "__sync_key";

/// Reads changed rows in `(timestamp, primary key)` keyset order.
///
/// The timestamp column is compared as `timestamptz` and the primary key as
/// text, the same representation the document id uses.
#[derive(Clone)]
pub struct PostgresChangeSource {
    pool: PgPool,
}

impl PostgresChangeSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build the keyset query for `table`.
///
/// Parameters: `$1` lower bound (exclusive), `$2` upper bound (inclusive),
/// `$3` limit, and with `resume` also `$4`/`$5` for the last row read.
pub(crate) fn changes_query(table: &TableSpec, resume: bool) -> Result<String> {
    let relation = quote_qualified(&table.name)?;
    validate_identifier(&table.timestamp_column)?;
    validate_identifier(&table.primary_key)?;
    let ts = format!("t.\"{}\"::timestamptz", table.timestamp_column);
    let key = format!("t.\"{}\"::text", table.primary_key);

    let mut query = format!(
        "SELECT {ts} AS {SYNC_TS}, {key} AS {SYNC_KEY}, t.* FROM {relation} t \
         WHERE {ts} > $1 AND {ts} <= $2"
    );
    if resume {
        query.push_str(&format!(" AND ({ts}, {key}) > ($4::timestamptz, $5::text)"));
    }
    query.push_str(&format!(" ORDER BY {ts}, {key} LIMIT $3"));
    Ok(query)
}

fn row_to_source_row(row: &Row) -> Result<SourceRow> {
    let updated_at: DateTime<Utc> = row
        .try_get(SYNC_TS)
        .context("Row has no timestamp value")?;
    let key: Option<String> = row.try_get(SYNC_KEY)?;
    let key = key.ok_or_else(|| anyhow!("Row has a NULL primary key"))?;

    let mut fields = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        if name == SYNC_TS || name == SYNC_KEY {
            continue;
        }
        let value = value_or_null(convert_postgres_value(row, i), name, &key);
        fields.insert(name.to_string(), value);
    }

    Ok(SourceRow {
        position: Position { updated_at, key },
        fields,
    })
}

#[async_trait]
impl ChangeSource for PostgresChangeSource {
    async fn current_time(&self) -> Result<DateTime<Utc>> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT now()", &[])
            .await
            .context("Failed to read the PostgreSQL clock")?;
        Ok(row.get(0))
    }

    async fn index_mapping(&self, table: &TableSpec) -> Result<IndexMapping> {
        let client = self.pool.get().await?;
        let columns = read_columns(&client, &table.name).await?;
        Ok(index_mapping(&columns))
    }

    async fn fetch_changes(
        &self,
        table: &TableSpec,
        range: &ChangeRange,
        limit: usize,
    ) -> Result<Vec<SourceRow>> {
        let query = changes_query(table, range.resume.is_some())?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&range.after, &range.until, &limit];
        if let Some(resume) = &range.resume {
            params.push(&resume.updated_at);
            params.push(&resume.key);
        }

        debug!("Fetching changes from {}: {query}", table.name);
        let client = self.pool.get().await?;
        let rows = client
            .query(&query, &params)
            .await
            .with_context(|| format!("Failed to query changes from {}", table.name))?;

        rows.iter().map(row_to_source_row).collect()
    }
}
