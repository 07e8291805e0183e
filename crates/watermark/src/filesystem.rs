//! Filesystem-based watermark storage implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::store::{apply_advance, Advance, Watermark, WatermarkStore};

/// Filesystem implementation of WatermarkStore trait.
///
/// Stores one `<table>.json` file per table, the name percent-encoded so that
/// distinct tables never share a file. Writes go to a temporary file
/// that is renamed over the old one, so a crash never leaves a torn record.
/// The conditional advance is serialized by an in-process lock, so only one
/// process may use a directory at a time.
pub struct FilesystemStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(table_name)))
    }

    async fn read_file(&self, table_name: &str) -> Result<Option<Watermark>> {
        let path = self.path_for(table_name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let w = serde_json::from_str(&content)
                    .with_context(|| format!("Corrupt watermark file {}", path.display()))?;
                Ok(Some(w))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

/// Keep ASCII letters, digits, `_` and `-`; encode every other byte as `%XX`.
pub(crate) fn file_stem(table_name: &str) -> String {
    let mut stem = String::with_capacity(table_name.len());
    for byte in table_name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl WatermarkStore for FilesystemStore {
    async fn read(&self, table_name: &str) -> Result<Option<Watermark>> {
        let _guard = self.lock.lock().await;
        self.read_file(table_name).await
    }

    async fn advance(&self, table_name: &str, to: DateTime<Utc>) -> Result<Advance> {
        let _guard = self.lock.lock().await;
        let existing = self.read_file(table_name).await?;
        let (outcome, updated) = apply_advance(existing.as_ref(), table_name, to, Utc::now());

        if let Some(w) = updated {
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.path_for(table_name);
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, serde_json::to_string_pretty(&w)?).await?;
            tokio::fs::rename(&tmp, &path).await?;
            tracing::debug!("Stored watermark for {} to {}", table_name, path.display());
        }

        Ok(outcome)
    }
}
