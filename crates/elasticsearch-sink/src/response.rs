//! Parsing of read responses.

use search_query::{EngineHealth, Hit, QueryError, SearchHits};
use serde_json::Value;

pub fn parse_search_response(response: &Value) -> Result<SearchHits, QueryError> {
    let hits = response
        .get("hits")
        .ok_or_else(|| QueryError::Engine("search response has no hits".to_string()))?;

    // 7.x and later report {value, relation}; older versions a bare number
    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
        None => 0,
    };

    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().map(parse_hit).collect())
        .unwrap_or_default();

    Ok(SearchHits { total, hits })
}

fn parse_hit(hit: &Value) -> Hit {
    Hit {
        id: hit
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source: hit
            .get("_source")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        sort: hit
            .get("sort")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

/// Index names from `_cat/indices?format=json`, without hidden indices.
pub fn parse_indices(response: &Value) -> Vec<String> {
    let mut indices: Vec<String> = response
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("index").and_then(Value::as_str))
                .filter(|name| !name.starts_with('.'))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    indices.sort();
    indices
}

pub fn parse_health(response: &Value) -> Result<EngineHealth, QueryError> {
    response
        .get("status")
        .and_then(Value::as_str)
        .map(|status| EngineHealth {
            status: status.to_string(),
        })
        .ok_or_else(|| QueryError::Engine("cluster health has no status".to_string()))
}
