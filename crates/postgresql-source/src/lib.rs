//! PostgreSQL side of pg-search-sync
//!
//! - [`PostgresChangeSource`] reads changed rows by timestamp column and
//!   primary key, converting each row to a JSON document
//! - [`PostgresWatermarkStore`] keeps watermarks in the `sync_status` table
//! - [`PgPool`] bounds the number of open connections

mod change;
mod ident;
mod pool;
mod schema;
mod value;
mod watermark_store;

pub use change::PostgresChangeSource;
pub use ident::{quote_qualified, validate_identifier};
pub use pool::{connect_with_retries, PgPool, PooledClient, PostgresConfig};
pub use schema::{column_mapping, index_mapping, read_columns, ColumnInfo};
pub use value::{convert_postgres_value, decimal_to_json};
pub use watermark_store::PostgresWatermarkStore;
