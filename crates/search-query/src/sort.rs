//! Sort specification.

use std::fmt;

use serde_json::{json, Map, Value};

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(order: &str) -> Result<Self, QueryError> {
        match order.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(QueryError::validation(format!(
                "Invalid sort order '{other}'; expected asc or desc"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

const TIEBREAKER: &str = "_id";

/// Ordered list of sort keys; never empty and always ends on a unique key.
///
/// Unless `_id` is already one of the keys, `_id asc` is appended so that no
/// two documents share a search-after position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl Default for SortSpec {
    /// Document id ascending.
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SortSpec {
    pub fn new(mut fields: Vec<SortField>) -> Self {
        if !fields.iter().any(|f| f.field == TIEBREAKER) {
            fields.push(SortField {
                field: TIEBREAKER.to_string(),
                order: SortOrder::Asc,
            });
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Parse a request body's `{"field": "asc" | "desc", ...}`, keeping key order.
    pub fn from_map(sort_by: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut fields = Vec::with_capacity(sort_by.len());
        for (field, order) in sort_by {
            let order = order.as_str().ok_or_else(|| {
                QueryError::validation(format!("Sort order for '{field}' must be a string"))
            })?;
            fields.push(SortField {
                field: checked_field(field)?,
                order: SortOrder::parse(order)?,
            });
        }
        Ok(Self::new(fields))
    }

    /// Parse a query string's `field:order,field2`; the order defaults to `asc`.
    pub fn from_param(sort_by: &str) -> Result<Self, QueryError> {
        let mut fields = Vec::new();
        for item in sort_by.split(',').filter(|s| !s.trim().is_empty()) {
            let (field, order) = match item.split_once(':') {
                Some((field, order)) => (field, SortOrder::parse(order)?),
                None => (item, SortOrder::Asc),
            };
            fields.push(SortField {
                field: checked_field(field)?,
                order,
            });
        }
        Ok(Self::new(fields))
    }

    /// Render as the engine's `sort` array.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.fields
                .iter()
                .map(|f| {
                    let mut clause = Map::new();
                    clause.insert(f.field.clone(), json!({ "order": f.order.as_str() }));
                    Value::Object(clause)
                })
                .collect(),
        )
    }
}

/// Canonical `field:order,...` form, used for cursor fingerprints.
impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", field.field, field.order.as_str())?;
        }
        Ok(())
    }
}

fn checked_field(field: &str) -> Result<String, QueryError> {
    let field = field.trim();
    if field.is_empty() {
        return Err(QueryError::validation("Sort field names must not be empty"));
    }
    Ok(field.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_id_ascending() {
        let spec = SortSpec::default();
        assert_eq!(spec.to_json(), json!([{"_id": {"order": "asc"}}]));
        assert_eq!(spec.to_string(), "_id:asc");
    }

    #[test]
    fn test_from_map_keeps_order() {
        let map = json!({"created_at": "desc", "amount": "ASC"});
        let spec = SortSpec::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(spec.to_string(), "created_at:desc,amount:asc,_id:asc");
        assert_eq!(
            spec.to_json(),
            json!([
                {"created_at": {"order": "desc"}},
                {"amount": {"order": "asc"}},
                {"_id": {"order": "asc"}}
            ])
        );
    }

    #[test]
    fn test_from_param() {
        let spec = SortSpec::from_param("created_at:desc,id").unwrap();
        assert_eq!(spec.to_string(), "created_at:desc,id:asc,_id:asc");
        assert_eq!(SortSpec::from_param("").unwrap(), SortSpec::default());
    }

    #[test]
    fn test_id_tiebreaker_is_not_duplicated() {
        let spec = SortSpec::from_param("_id:desc,status").unwrap();
        assert_eq!(spec.to_string(), "_id:desc,status:asc");

        let spec = SortSpec::from_param("status").unwrap();
        assert_eq!(spec.fields().last().unwrap().field, "_id");
        assert_eq!(spec.fields().len(), 2);
    }

    #[test]
    fn test_invalid_order_is_rejected() {
        assert!(SortSpec::from_param("created_at:up").is_err());
        let map = json!({"created_at": 1});
        assert!(SortSpec::from_map(map.as_object().unwrap()).is_err());
        assert!(SortSpec::from_param(":asc").is_err());
    }
}
