//! Declarative field filters.
//!
//! A request's `query_fields` object is parsed once into a [`FilterSpec`];
//! any shape outside the three recognised variants is rejected here, before
//! a query is built.

use serde_json::{Map, Value};

use crate::error::QueryError;

/// Bounds of a range filter. At least one is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gte: Option<Value>,
    pub lte: Option<Value>,
    pub gt: Option<Value>,
    pub lt: Option<Value>,
}

/// Condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Field equals a scalar value
    Exact(Value),
    /// Field equals one of the values
    OneOf(Vec<Value>),
    Range(RangeBounds),
}

/// Conjunction of per-field conditions, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub fields: Vec<(String, FieldFilter)>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn parse(query_fields: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut fields = Vec::with_capacity(query_fields.len());
        for (field, value) in query_fields {
            if field.is_empty() {
                return Err(QueryError::validation("Filter field names must not be empty"));
            }
            fields.push((field.clone(), parse_field(field, value)?));
        }
        Ok(Self { fields })
    }
}

fn parse_field(field: &str, value: &Value) -> Result<FieldFilter, QueryError> {
    match value {
        Value::Null => Err(QueryError::validation(format!(
            "Filter on '{field}' is null; use a value, a list of values or a range"
        ))),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(FieldFilter::Exact(value.clone())),
        Value::Array(values) => {
            if values.is_empty() {
                return Err(QueryError::validation(format!(
                    "Filter on '{field}' has an empty value list"
                )));
            }
            if let Some(bad) = values.iter().find(|v| !is_scalar(v)) {
                return Err(QueryError::validation(format!(
                    "Filter on '{field}' may only list scalar values, got {bad}"
                )));
            }
            Ok(FieldFilter::OneOf(values.clone()))
        }
        Value::Object(ops) => parse_range(field, ops).map(FieldFilter::Range),
    }
}

fn parse_range(field: &str, ops: &Map<String, Value>) -> Result<RangeBounds, QueryError> {
    if ops.is_empty() {
        return Err(QueryError::validation(format!(
            "Range filter on '{field}' has no bounds"
        )));
    }

    let mut bounds = RangeBounds::default();
    for (op, bound) in ops {
        if !is_scalar(bound) {
            return Err(QueryError::validation(format!(
                "Range bound '{op}' on '{field}' must be a scalar value"
            )));
        }
        let slot = match op.as_str() {
            "gte" => &mut bounds.gte,
            "lte" => &mut bounds.lte,
            "gt" => &mut bounds.gt,
            "lt" => &mut bounds.lt,
            other => {
                return Err(QueryError::validation(format!(
                    "Unknown operator '{other}' on '{field}'; expected gte, lte, gt or lt"
                )))
            }
        };
        *slot = Some(bound.clone());
    }
    Ok(bounds)
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}
