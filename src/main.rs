//! Command-line interface for pg-search-sync
//!
//! # Usage Examples
//!
//! ## Sync
//! ```bash
//! # Continuous sync, watermarks in the source database's sync_status table
//! PG_HOST=db ES_HOST=search pg-search-sync sync --config config.yaml
//!
//! # A single cycle per table without writing anything
//! pg-search-sync sync --config config.yaml --once --dry-run
//!
//! # Watermarks as JSON files instead of a database table
//! pg-search-sync sync --config config.yaml \
//!   --watermark-store filesystem --watermark-dir /var/lib/pg-search-sync
//! ```
//!
//! ## Search API
//! ```bash
//! pg-search-sync serve --bind 0.0.0.0:8000
//! ```
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=info,sync_core=debug`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use elasticsearch_sink::ElasticsearchClient;
use pg_search_sync::config::SyncConfig;
use pg_search_sync::server::{self, AppState};
use pg_search_sync::sync::{run_sync, shutdown_on_ctrl_c, SyncOptions};
use pg_search_sync::{SearchOpts, SourceOpts};
use pg_search_sync_postgresql_source::PgPool;
use watermark::WatermarkStorage;

#[derive(Parser)]
#[command(name = "pg-search-sync")]
#[command(about = "Replicate PostgreSQL tables into Elasticsearch and search them")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Incrementally sync the configured tables into their indices
    Sync {
        /// YAML file with a top-level `sync_config` section
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Run one cycle per table and exit
        #[arg(long)]
        once: bool,

        /// Read and convert rows without writing documents or watermarks
        #[arg(long)]
        dry_run: bool,

        /// Where watermarks are kept
        #[arg(long, value_enum, default_value = "postgres")]
        watermark_store: WatermarkStoreKind,

        /// Directory for `--watermark-store filesystem`
        #[arg(long, default_value = ".pg-search-sync-watermarks")]
        watermark_dir: String,

        #[command(flatten)]
        source: SourceOpts,

        #[command(flatten)]
        search: SearchOpts,
    },

    /// Serve the search API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8000", env = "API_BIND")]
        bind: SocketAddr,

        #[command(flatten)]
        source: SourceOpts,

        #[command(flatten)]
        search: SearchOpts,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WatermarkStoreKind {
    /// `sync_status` table in the source database
    Postgres,
    /// One JSON file per table
    Filesystem,
    /// In memory, lost on exit
    Memory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let shutdown = shutdown_on_ctrl_c();

    match cli.command {
        Commands::Sync {
            config,
            once,
            dry_run,
            watermark_store,
            watermark_dir,
            source,
            search,
        } => {
            let config = SyncConfig::from_file(&config)?;
            let watermarks = match watermark_store {
                WatermarkStoreKind::Postgres => WatermarkStorage::Postgres {
                    table_name: config.watermark_table.clone(),
                },
                WatermarkStoreKind::Filesystem => WatermarkStorage::Filesystem { dir: watermark_dir },
                WatermarkStoreKind::Memory => WatermarkStorage::Memory,
            };
            let options = SyncOptions {
                once,
                dry_run,
                watermarks,
            };
            run_sync(&source, &search, config, options, shutdown).await
        }
        Commands::Serve {
            bind,
            source,
            search,
        } => {
            let pool = PgPool::new(&source.to_config());
            let client = ElasticsearchClient::new(&search.to_config()?)?;
            server::serve(bind, AppState::new(client, pool), shutdown).await
        }
    }
}
