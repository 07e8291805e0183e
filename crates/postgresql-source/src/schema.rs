//! Index mapping derived from a table's column types.

use anyhow::{bail, Context, Result};
use search_sink::{FieldMapping, IndexMapping};
use tokio_postgres::Client;

use crate::ident::split_qualified;

/// One column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Read the columns of `table` (`table` or `schema.table`) in ordinal order.
pub async fn read_columns(client: &Client, table: &str) -> Result<Vec<ColumnInfo>> {
    let (schema, name) = split_qualified(table);
    let rows = client
        .query(
            "SELECT column_name::text, data_type::text
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
            &[&schema, &name],
        )
        .await
        .with_context(|| format!("Failed to read columns of {table}"))?;

    if rows.is_empty() {
        bail!("Table '{table}' not found or has no columns");
    }
    Ok(rows
        .iter()
        .map(|row| ColumnInfo::new(row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}

/// Map a PostgreSQL `data_type` to a search field.
pub fn column_mapping(data_type: &str) -> FieldMapping {
    let field_type = match data_type.to_ascii_lowercase().as_str() {
        "integer" => "integer",
        "bigint" => "long",
        "smallint" => "short",
        "decimal" | "numeric" | "double precision" => "double",
        "real" => "float",
        "character varying" => "keyword",
        "text" => return FieldMapping::new("text").with_keyword_subfield(),
        "boolean" => "boolean",
        "timestamp without time zone" | "timestamp with time zone" | "date" => "date",
        "json" | "jsonb" => "object",
        _ => "keyword",
    };
    FieldMapping::new(field_type)
}

pub fn index_mapping(columns: &[ColumnInfo]) -> IndexMapping {
    let mut mapping = IndexMapping::new();
    for column in columns {
        mapping.insert(column.name.clone(), column_mapping(&column.data_type));
    }
    mapping
}
