//! Mapping Elasticsearch error responses onto the workspace error types.

use search_query::QueryError;
use search_sink::SinkError;
use serde_json::Value;

/// Short `type: reason` description of an error body.
///
/// Only the engine's own classification is kept; stack traces and request
/// echoes are dropped.
pub fn error_reason(body: &Value) -> String {
    let error = match body.get("error") {
        Some(error) => error,
        None => return "unknown error".to_string(),
    };
    if let Some(message) = error.as_str() {
        return message.to_string();
    }
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (Some(kind), None) => kind.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => "unknown error".to_string(),
    }
}

fn error_type(body: &Value) -> Option<&str> {
    body.pointer("/error/type").and_then(Value::as_str)
}

/// Error for a write request that came back with a non-success status.
pub fn sink_error(status: u16, body: &Value) -> SinkError {
    let reason = error_reason(body);
    match status {
        429 => SinkError::RateLimited(reason),
        _ => SinkError::Rejected {
            status,
            message: reason,
        },
    }
}

/// Error for a read request against `index`.
pub fn query_error(index: &str, status: u16, body: &Value) -> QueryError {
    let missing_index =
        error_type(body) == Some("index_not_found_exception") || body.get("error").is_none();
    match status {
        404 if missing_index => QueryError::UnknownIndex(index.to_string()),
        400 => QueryError::Validation(error_reason(body)),
        429 | 502 | 503 | 504 => QueryError::Transport(format!(
            "search engine unavailable (status {status})"
        )),
        _ => QueryError::Engine(format!("status {status}: {}", error_reason(body))),
    }
}

pub(crate) fn transport_reason(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        // reqwest includes the URL, which never carries credentials here
        error.to_string()
    }
}
