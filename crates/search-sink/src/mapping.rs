//! Index mapping description.

use std::collections::BTreeMap;

use serde_json::{json, Value};

/// Declared type of one indexed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// Engine field type (`keyword`, `long`, `date`, ...)
    pub field_type: String,
    /// Add a `keyword` sub-field for sorting and aggregations on text
    pub keyword_subfield: bool,
}

impl FieldMapping {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            keyword_subfield: false,
        }
    }

    pub fn with_keyword_subfield(mut self) -> Self {
        self.keyword_subfield = true;
        self
    }
}

/// Field mappings for one index, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMapping {
    pub properties: BTreeMap<String, FieldMapping>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, mapping: FieldMapping) {
        self.properties.insert(field.into(), mapping);
    }

    /// Render as the `mappings` body understood by Elasticsearch.
    pub fn to_json(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, m)| {
                let mut field = json!({ "type": m.field_type });
                if m.keyword_subfield {
                    field["fields"] = json!({
                        "keyword": { "type": "keyword", "ignore_above": 256 }
                    });
                }
                (name.clone(), field)
            })
            .collect();
        json!({ "properties": properties })
    }
}
