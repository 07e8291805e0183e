//! `_bulk` request bodies and responses.

use std::time::Duration;

use search_sink::{BulkItemFailure, BulkOutcome, IndexDocument, SinkError};
use serde_json::{json, Value};

use crate::error::error_reason;

/// NDJSON body upserting `documents` into `index`.
///
/// `index` actions replace whole documents, so replaying a batch leaves the
/// index unchanged.
pub fn bulk_body(index: &str, documents: &[IndexDocument]) -> String {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&Value::Object(doc.source.clone()).to_string());
        body.push('\n');
    }
    body
}

/// Read a successful `_bulk` response.
pub fn parse_bulk_response(
    response: &Value,
    documents: &[IndexDocument],
) -> Result<BulkOutcome, SinkError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SinkError::Rejected {
            status: 200,
            message: "bulk response has no items".to_string(),
        })?;
    if items.len() != documents.len() {
        return Err(SinkError::Rejected {
            status: 200,
            message: format!(
                "bulk response has {} items for {} documents",
                items.len(),
                documents.len()
            ),
        });
    }

    let mut outcome = BulkOutcome {
        took: response
            .get("took")
            .and_then(Value::as_u64)
            .map(Duration::from_millis),
        ..Default::default()
    };

    // Items come back in request order
    for (item, doc) in items.iter().zip(documents) {
        let result = item
            .as_object()
            .and_then(|actions| actions.values().next())
            .unwrap_or(&Value::Null);
        let status = result
            .get("status")
            .and_then(Value::as_u64)
            .unwrap_or(500) as u16;
        if (200..300).contains(&status) {
            outcome.succeeded += 1;
        } else {
            outcome.failures.push(BulkItemFailure {
                id: doc.id.clone(),
                status,
                reason: error_reason(result),
            });
        }
    }
    Ok(outcome)
}
