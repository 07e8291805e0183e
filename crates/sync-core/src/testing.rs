//! In-memory fakes for the engine's seams.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use search_sink::{
    BulkItemFailure, BulkOutcome, FieldMapping, IndexDocument, IndexMapping, SearchSink, SinkError,
};
use serde_json::{json, Map, Value};

use crate::source::{ChangeBatch, ChangeRange, ChangeSource, Position, SourceRow, TableSpec};

pub fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0)
        .single()
        .unwrap()
}

pub fn row(id: i64, updated_at: DateTime<Utc>) -> SourceRow {
    let mut fields = Map::new();
    fields.insert("id".to_string(), json!(id));
    fields.insert("updated_at".to_string(), json!(updated_at.to_rfc3339()));
    SourceRow {
        position: Position {
            updated_at,
            key: id.to_string(),
        },
        fields,
    }
}

pub fn batch_of(ids: std::ops::RangeInclusive<i64>) -> ChangeBatch {
    ChangeBatch::new(ids.map(|id| row(id, ts(id))).collect())
}

pub fn table(name: &str) -> TableSpec {
    TableSpec {
        name: name.to_string(),
        index_name: name.to_string(),
        timestamp_column: "updated_at".to_string(),
        primary_key: "id".to_string(),
    }
}

#[derive(Default)]
struct SourceState {
    rows: Vec<SourceRow>,
    now: Option<DateTime<Utc>>,
    failures: VecDeque<String>,
    fetches: Vec<usize>,
}

/// A table held in memory, ordered the way a database would order it.
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new(rows: Vec<SourceRow>, now: DateTime<Utc>) -> Self {
        let source = Self::default();
        {
            let mut state = source.state.lock().unwrap();
            state.rows = rows;
            state.now = Some(now);
        }
        source
    }

    pub fn upsert(&self, row: SourceRow) {
        let mut state = self.state.lock().unwrap();
        state.rows.retain(|r| r.position.key != row.position.key);
        state.rows.push(row);
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.state.lock().unwrap().now = Some(now);
    }

    pub fn fail_next_fetch(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push_back(message.to_string());
    }

    /// Limits passed to each fetch, in call order.
    pub fn fetch_limits(&self) -> Vec<usize> {
        self.state.lock().unwrap().fetches.clone()
    }
}

#[async_trait]
impl ChangeSource for MemorySource {
    async fn current_time(&self) -> Result<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .now
            .ok_or_else(|| anyhow!("clock not set"))
    }

    async fn index_mapping(&self, _table: &TableSpec) -> Result<IndexMapping> {
        let mut mapping = IndexMapping::new();
        mapping.insert("id", FieldMapping::new("long"));
        mapping.insert("updated_at", FieldMapping::new("date"));
        Ok(mapping)
    }

    async fn fetch_changes(
        &self,
        _table: &TableSpec,
        range: &ChangeRange,
        limit: usize,
    ) -> Result<Vec<SourceRow>> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(limit);
        if let Some(message) = state.failures.pop_front() {
            return Err(anyhow!(message));
        }

        let mut rows: Vec<SourceRow> = state
            .rows
            .iter()
            .filter(|r| r.position.updated_at > range.after && r.position.updated_at <= range.until)
            .filter(|r| match &range.resume {
                Some(resume) => r.position > *resume,
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.position.cmp(&b.position));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[derive(Default)]
struct SinkState {
    indices: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    mappings: HashMap<String, IndexMapping>,
    reject_once: HashMap<String, u16>,
    reject_always: HashMap<String, u16>,
    /// Failures keyed by 1-based bulk request number
    request_failures: HashMap<usize, SinkError>,
    requests: Vec<usize>,
}

/// A search index held in memory, keyed by document id.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_once(&self, id: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .reject_once
            .insert(id.to_string(), status);
    }

    pub fn reject_always(&self, id: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .reject_always
            .insert(id.to_string(), status);
    }

    pub fn fail_next(&self, error: SinkError) {
        let mut state = self.state.lock().unwrap();
        let next = state.requests.len() + 1;
        state.request_failures.insert(next, error);
    }

    /// Fail the `n`th bulk request (1-based) as a whole.
    pub fn fail_request(&self, n: usize, error: SinkError) {
        self.state.lock().unwrap().request_failures.insert(n, error);
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(index)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Document ids in numeric order.
    pub fn document_ids(&self, index: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .indices
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort_by_key(|id| id.parse::<i64>().unwrap_or(i64::MAX));
        ids
    }

    pub fn has_mapping(&self, index: &str) -> bool {
        self.state.lock().unwrap().mappings.contains_key(index)
    }

    /// Number of documents carried by each bulk request, in call order.
    pub fn request_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl SearchSink for MemorySink {
    async fn ensure_index(&self, index: &str, mapping: &IndexMapping) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        state.indices.entry(index.to_string()).or_default();
        state.mappings.insert(index.to_string(), mapping.clone());
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BulkOutcome, SinkError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(documents.len());
        let n = state.requests.len();
        if let Some(error) = state.request_failures.remove(&n) {
            return Err(error);
        }

        let mut outcome = BulkOutcome::default();
        for doc in documents {
            let status = state
                .reject_once
                .remove(&doc.id)
                .or_else(|| state.reject_always.get(&doc.id).copied());
            if let Some(status) = status {
                outcome.failures.push(BulkItemFailure {
                    id: doc.id.clone(),
                    status,
                    reason: format!("injected failure {status}"),
                });
                continue;
            }
            state
                .indices
                .entry(index.to_string())
                .or_default()
                .insert(doc.id.clone(), doc.source.clone());
            outcome.succeeded += 1;
        }
        Ok(outcome)
    }
}
