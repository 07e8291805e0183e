//! Filter and pagination compiled to an Elasticsearch search body.

use serde_json::{json, Map, Value};

use crate::filter::{FieldFilter, FilterSpec, RangeBounds};
use crate::projection::Projection;
use crate::sort::SortSpec;

/// Compile a filter into a `bool.must` conjunction.
pub fn compile_filter(filter: &FilterSpec) -> Value {
    let must: Vec<Value> = filter
        .fields
        .iter()
        .map(|(field, condition)| compile_field(field, condition))
        .collect();
    json!({ "bool": { "must": must } })
}

fn compile_field(field: &str, condition: &FieldFilter) -> Value {
    let (kind, body) = match condition {
        FieldFilter::Exact(value) => ("term", value.clone()),
        FieldFilter::OneOf(values) => ("terms", Value::Array(values.clone())),
        FieldFilter::Range(bounds) => ("range", Value::Object(range_body(bounds))),
    };
    let mut inner = Map::new();
    inner.insert(field.to_string(), body);
    let mut clause = Map::new();
    clause.insert(kind.to_string(), Value::Object(inner));
    Value::Object(clause)
}

fn range_body(bounds: &RangeBounds) -> Map<String, Value> {
    let mut body = Map::new();
    for (op, bound) in [
        ("gte", &bounds.gte),
        ("gt", &bounds.gt),
        ("lte", &bounds.lte),
        ("lt", &bounds.lt),
    ] {
        if let Some(value) = bound {
            body.insert(op.to_string(), value.clone());
        }
    }
    body
}

/// Builds one search request body.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Value,
    sort: SortSpec,
    projection: Projection,
    size: u32,
    from: Option<u64>,
    search_after: Option<Vec<Value>>,
}

impl QueryBuilder {
    /// Match the documents selected by `filter`.
    pub fn new(filter: &FilterSpec) -> Self {
        Self::with_query(compile_filter(filter))
    }

    /// Match every document.
    pub fn match_all() -> Self {
        Self::with_query(json!({ "match_all": {} }))
    }

    fn with_query(query: Value) -> Self {
        Self {
            query,
            sort: SortSpec::default(),
            projection: Projection::All,
            size: crate::pagination::DEFAULT_PAGE_SIZE,
            from: None,
            search_after: None,
        }
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn offset(mut self, from: u64, size: u32) -> Self {
        self.from = Some(from);
        self.size = size;
        self.search_after = None;
        self
    }

    pub fn search_after(mut self, sort_values: Option<Vec<Value>>, size: u32) -> Self {
        self.search_after = sort_values;
        self.size = size;
        self.from = None;
        self
    }

    pub fn build(&self) -> Value {
        let mut body = json!({
            "query": self.query,
            "sort": self.sort.to_json(),
            "size": self.size,
            "track_total_hits": true,
        });
        if let Some(from) = self.from {
            body["from"] = json!(from);
        }
        if let Some(values) = &self.search_after {
            body["search_after"] = Value::Array(values.clone());
        }
        if let Some(source) = self.projection.source_filter() {
            body["_source"] = source;
        }
        body
    }
}
