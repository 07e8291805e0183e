//! pg-search-sync library
//!
//! Replicates PostgreSQL tables into Elasticsearch indices and serves a
//! filter and pagination API over the replicated documents.
//!
//! # Crates
//!
//! - `sync_core` - the incremental sync engine (coordinator, batch reader,
//!   bulk indexer)
//! - `pg_search_sync_postgresql_source` - changed-row reader, index mapping
//!   derivation and watermark table for PostgreSQL
//! - `elasticsearch_sink` - Elasticsearch REST client used for both writes and
//!   searches
//! - `search_query` - filter compilation, offset and cursor pagination
//! - `watermark` - per-table watermark stores
//!
//! # CLI Usage
//!
//! ```bash
//! # Sync continuously, keeping watermarks in the sync_status table
//! pg-search-sync sync --config config.yaml
//!
//! # One cycle per table, writing nothing
//! pg-search-sync sync --config config.yaml --once --dry-run
//!
//! # Serve the search API
//! pg-search-sync serve --bind 0.0.0.0:8000
//! ```

use std::time::Duration;

use clap::Parser;
use elasticsearch_sink::ElasticsearchConfig;
use pg_search_sync_postgresql_source::PostgresConfig;

pub mod config;
pub mod server;
pub mod sync;

/// PostgreSQL connection options
#[derive(Parser, Clone)]
pub struct SourceOpts {
    /// PostgreSQL host
    #[arg(long, default_value = "localhost", env = "PG_HOST")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, default_value = "5432", env = "PG_PORT")]
    pub pg_port: u16,

    /// PostgreSQL database
    #[arg(long, default_value = "postgres", env = "PG_DATABASE")]
    pub pg_database: String,

    /// PostgreSQL user
    #[arg(long, default_value = "postgres", env = "PG_USER")]
    pub pg_user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "", env = "PG_PASSWORD", hide_env_values = true)]
    pub pg_password: String,

    /// Maximum number of PostgreSQL connections
    #[arg(long, default_value = "10")]
    pub pool_size: usize,
}

impl SourceOpts {
    pub fn to_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.pg_host.clone(),
            port: self.pg_port,
            database: self.pg_database.clone(),
            user: self.pg_user.clone(),
            password: self.pg_password.clone(),
            pool_size: self.pool_size,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Elasticsearch connection options
#[derive(Parser, Clone)]
pub struct SearchOpts {
    /// Elasticsearch host
    #[arg(long, default_value = "localhost", env = "ES_HOST")]
    pub es_host: String,

    /// Elasticsearch port
    #[arg(long, default_value = "9200", env = "ES_PORT")]
    pub es_port: u16,

    /// Elasticsearch user (basic auth)
    #[arg(long, env = "ES_USER")]
    pub es_user: Option<String>,

    /// Elasticsearch password (basic auth)
    #[arg(long, env = "ES_PASSWORD", hide_env_values = true)]
    pub es_password: Option<String>,

    /// Connect over HTTPS
    #[arg(long, env = "ES_USE_SSL")]
    pub es_use_ssl: bool,

    /// Per-request timeout (e.g. "30s", "2m")
    #[arg(long, default_value = "30s")]
    pub request_timeout: String,
}

impl SearchOpts {
    pub fn to_config(&self) -> anyhow::Result<ElasticsearchConfig> {
        Ok(ElasticsearchConfig {
            host: self.es_host.clone(),
            port: self.es_port,
            user: self.es_user.clone(),
            password: self.es_password.clone(),
            use_ssl: self.es_use_ssl,
            timeout: config::parse_duration(&self.request_timeout)?,
        })
    }
}
