//! Field projection.

use serde_json::{json, Map, Value};

use crate::error::QueryError;

/// Which document attributes a response carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Exactly these fields, in this order
    Include(Vec<String>),
    /// Everything except these fields
    Exclude(Vec<String>),
}

impl Projection {
    /// Build from the request's `fields` / `exclude_fields`; empty lists count
    /// as absent and giving both is an error.
    pub fn new(
        fields: Option<Vec<String>>,
        exclude_fields: Option<Vec<String>>,
    ) -> Result<Self, QueryError> {
        let fields = fields.filter(|f| !f.is_empty());
        let exclude_fields = exclude_fields.filter(|f| !f.is_empty());
        match (fields, exclude_fields) {
            (Some(_), Some(_)) => Err(QueryError::validation(
                "Cannot specify both fields and exclude_fields",
            )),
            (Some(fields), None) => Ok(Projection::Include(fields)),
            (None, Some(excluded)) => Ok(Projection::Exclude(excluded)),
            (None, None) => Ok(Projection::All),
        }
    }

    /// Parse comma-separated query parameters.
    pub fn from_params(
        fields: Option<&str>,
        exclude_fields: Option<&str>,
    ) -> Result<Self, QueryError> {
        Self::new(fields.map(split_list), exclude_fields.map(split_list))
    }

    /// The engine's `_source` filter, if any.
    pub fn source_filter(&self) -> Option<Value> {
        match self {
            Projection::All => None,
            Projection::Include(fields) => Some(json!(fields)),
            Projection::Exclude(fields) => Some(json!({ "excludes": fields })),
        }
    }

    /// Filter a returned document again on our side.
    pub fn apply(&self, mut doc: Map<String, Value>) -> Map<String, Value> {
        match self {
            Projection::All => doc,
            Projection::Include(fields) => fields
                .iter()
                .filter_map(|f| doc.remove(f).map(|v| (f.clone(), v)))
                .collect(),
            Projection::Exclude(fields) => {
                for field in fields {
                    doc.remove(field);
                }
                doc
            }
        }
    }

    /// Reported back as `selected_fields`.
    pub fn selected_fields(&self) -> Option<Vec<String>> {
        match self {
            Projection::Include(fields) => Some(fields.clone()),
            _ => None,
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
