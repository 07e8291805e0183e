//! Watermark management for pg-search-sync
//!
//! A watermark records, per source table, the `updated_at` boundary up to
//! which every row has been indexed. The sync engine reads it at the start
//! of a cycle and advances it only once the whole cycle has been indexed.
//!
//! # Architecture
//!
//! - [`WatermarkStore`] abstracts the storage backend behind a read and a
//!   conditional advance that never lets a watermark move backwards
//! - [`Watermark`] is the stored record
//!
//! ## Storage Backends
//!
//! - `MemoryStore` - in-process map, used by tests and `--dry-run`
//! - `FilesystemStore` - one JSON file per table
//! - `PostgresWatermarkStore` - the `sync_status` table in the source
//!   database (in the postgresql-source crate)

mod filesystem;
mod memory;
pub mod store;


pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use store::{Advance, Watermark, WatermarkStore};

/// Configuration for where watermarks are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkStorage {
    /// Keep watermarks in memory only. Nothing survives a restart.
    Memory,

    /// Store watermarks as JSON files in a directory.
    Filesystem {
        /// Directory holding one `<table>.json` file per table
        dir: String,
    },

    /// Store watermarks in a table of the source PostgreSQL database.
    Postgres {
        /// Name of the watermark table (default: `sync_status`)
        table_name: String,
    },
}

impl Default for WatermarkStorage {
    fn default() -> Self {
        Self::Postgres {
            table_name: "sync_status".to_string(),
        }
    }
}
