//! Configuration loading.

mod duration;
mod sync_config;

pub use duration::{deserialize_duration, parse_duration};
pub use sync_config::{SyncConfig, TableConfig};
