//! The YAML sync configuration.
//!
//! ```yaml
//! sync_config:
//!   sync_interval: 60
//!   pool_size: 5
//!   tables:
//!     - name: public.orders
//!       index_name: orders
//!       timestamp_column: updated_at
//!       primary_key: id
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pg_search_sync_postgresql_source::{quote_qualified, validate_identifier};
use serde::Deserialize;
use sync_core::{
    BatchSizeConfig, CoordinatorConfig, IndexerConfig, RateLimitConfig, RetryPolicy,
    SyncRunnerConfig, TableSpec,
};

use super::duration::deserialize_duration;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    sync_config: SyncConfig,
}

/// One table to replicate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    /// Defaults to the table name without its schema
    pub index_name: Option<String>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
}

impl TableConfig {
    pub fn to_spec(&self) -> TableSpec {
        let index_name = self.index_name.clone().unwrap_or_else(|| {
            let bare = self.name.rsplit('.').next().unwrap_or(&self.name);
            bare.to_lowercase()
        });
        TableSpec {
            name: self.name.clone(),
            index_name,
            timestamp_column: self.timestamp_column.clone(),
            primary_key: self.primary_key.clone(),
        }
    }
}

/// Everything the `sync` command needs besides connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub tables: Vec<TableConfig>,

    #[serde(default = "default_interval", deserialize_with = "deserialize_duration")]
    pub sync_interval: Duration,

    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_grow_step")]
    pub batch_grow_step: usize,
    #[serde(default = "default_shrink_step")]
    pub batch_shrink_step: usize,
    #[serde(default = "default_target_latency", deserialize_with = "deserialize_duration")]
    pub target_latency: Duration,

    /// Documents per second across all tables, 0 for no limit
    #[serde(default)]
    pub rate_limit: u64,
    pub burst: Option<u64>,

    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
    #[serde(default = "default_retries")]
    pub document_retries: u32,
    #[serde(default = "default_retries")]
    pub batch_retries: u32,
    #[serde(default = "default_retry_base_delay", deserialize_with = "deserialize_duration")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_retry_max_delay", deserialize_with = "deserialize_duration")]
    pub retry_max_delay: Duration,

    /// Maximum number of tables syncing at once
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_watermark_table")]
    pub watermark_table: String,
}

fn default_timestamp_column() -> String {
    "updated_at".to_string()
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_min_batch_size() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    5000
}

fn default_grow_step() -> usize {
    100
}

fn default_shrink_step() -> usize {
    500
}

fn default_target_latency() -> Duration {
    Duration::from_secs(2)
}

fn default_error_threshold() -> f64 {
    0.1
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_pool_size() -> usize {
    5
}

fn default_watermark_table() -> String {
    "sync_status".to_string()
}

impl SyncConfig {
    /// Read and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sync config {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid sync config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(content).context("Failed to parse sync config YAML")?;
        file.sync_config.validate()?;
        Ok(file.sync_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            bail!("No tables configured for syncing");
        }

        let mut names = HashSet::new();
        let mut indices = HashSet::new();
        for table in &self.tables {
            quote_qualified(&table.name)
                .with_context(|| format!("Invalid table name '{}'", table.name))?;
            for column in [&table.timestamp_column, &table.primary_key] {
                validate_identifier(column)
                    .with_context(|| format!("Invalid column in table '{}'", table.name))?;
            }
            if !names.insert(table.name.as_str()) {
                bail!("Table '{}' is configured more than once", table.name);
            }
            let spec = table.to_spec();
            search_query::validate_index(&spec.index_name)
                .with_context(|| format!("Invalid index for table '{}'", table.name))?;
            if !indices.insert(spec.index_name.clone()) {
                bail!("Index '{}' is the target of more than one table", spec.index_name);
            }
        }

        self.batch_config().validate()?;
        if !(0.0..=1.0).contains(&self.error_threshold) {
            bail!(
                "error_threshold must be between 0 and 1, got {}",
                self.error_threshold
            );
        }
        if self.pool_size == 0 {
            bail!("pool_size must be at least 1");
        }
        if self.retry_base_delay > self.retry_max_delay {
            bail!("retry_base_delay must not exceed retry_max_delay");
        }
        quote_qualified(&self.watermark_table).context("Invalid watermark_table")?;
        Ok(())
    }

    pub fn table_specs(&self) -> Vec<TableSpec> {
        self.tables.iter().map(TableConfig::to_spec).collect()
    }

    pub fn batch_config(&self) -> BatchSizeConfig {
        BatchSizeConfig {
            min: self.min_batch_size,
            max: self.max_batch_size,
            grow_step: self.batch_grow_step,
            shrink_step: self.batch_shrink_step,
            target_latency: self.target_latency,
        }
    }

    fn retry_policy(&self, max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, self.retry_base_delay, self.retry_max_delay)
            .with_jitter(0.1)
    }

    pub fn indexer_config(&self, dry_run: bool) -> IndexerConfig {
        let rate_limit = match self.burst {
            Some(burst) => RateLimitConfig::with_burst(self.rate_limit, burst),
            None => RateLimitConfig::new(self.rate_limit),
        };
        IndexerConfig {
            error_threshold: self.error_threshold,
            document_retry: self.retry_policy(self.document_retries),
            rate_limit,
            dry_run,
        }
    }

    pub fn runner_config(&self) -> SyncRunnerConfig {
        SyncRunnerConfig {
            pool_size: self.pool_size,
            coordinator: CoordinatorConfig {
                interval: self.sync_interval,
                batch: self.batch_config(),
                batch_retry: self.retry_policy(self.batch_retries),
            },
        }
    }
}
