//! In-memory watermark storage.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::store::{apply_advance, Advance, Watermark, WatermarkStore};

/// Watermarks kept in a process-local map.
#[derive(Default)]
pub struct MemoryStore {
    watermarks: Mutex<HashMap<String, Watermark>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with known watermarks.
    pub fn with_watermarks(watermarks: impl IntoIterator<Item = (String, DateTime<Utc>)>) -> Self {
        let now = Utc::now();
        let map = watermarks
            .into_iter()
            .map(|(table_name, last_sync_time)| {
                let w = Watermark {
                    table_name: table_name.clone(),
                    last_sync_time,
                    created_at: now,
                    updated_at: now,
                };
                (table_name, w)
            })
            .collect();
        Self {
            watermarks: Mutex::new(map),
        }
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn read(&self, table_name: &str) -> Result<Option<Watermark>> {
        Ok(self.watermarks.lock().await.get(table_name).cloned())
    }

    async fn advance(&self, table_name: &str, to: DateTime<Utc>) -> Result<Advance> {
        let mut watermarks = self.watermarks.lock().await;
        let (outcome, updated) = apply_advance(watermarks.get(table_name), table_name, to, Utc::now());
        if let Some(w) = updated {
            watermarks.insert(table_name.to_string(), w);
        }
        Ok(outcome)
    }
}
