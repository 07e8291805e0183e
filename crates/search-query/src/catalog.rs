//! Field listing from an index mapping.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::QueryError;

/// Top-level fields of an index and their declared types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCatalog {
    pub index: String,
    pub fields: Vec<String>,
    pub field_types: Map<String, Value>,
}

impl FieldCatalog {
    /// Read a `GET /{index}/_mapping` response.
    ///
    /// The response is keyed by concrete index name, which differs from the
    /// requested name for aliases, so the first entry is used.
    pub fn from_mapping_response(index: &str, response: &Value) -> Result<Self, QueryError> {
        let entry = response
            .get(index)
            .or_else(|| response.as_object().and_then(|m| m.values().next()))
            .ok_or_else(|| QueryError::UnknownIndex(index.to_string()))?;

        let properties = entry
            .pointer("/mappings/properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut fields = Vec::with_capacity(properties.len());
        let mut field_types = Map::new();
        for (name, definition) in properties {
            let field_type = match definition.get("type") {
                Some(t) => t.clone(),
                // Object fields declare sub-properties instead of a type
                None if definition.get("properties").is_some() => Value::from("object"),
                None => Value::Null,
            };
            fields.push(name.clone());
            field_types.insert(name, field_type);
        }

        Ok(Self {
            index: index.to_string(),
            fields,
            field_types,
        })
    }
}
