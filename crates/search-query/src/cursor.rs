//! Opaque search-after cursors.
//!
//! A cursor is URL-safe base64 over a small JSON document carrying a format
//! version, the sort values of the last returned hit and a fingerprint of the
//! index and sort it was produced for. A cursor replayed against any other
//! index or sort is rejected.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::QueryError;
use crate::sort::SortSpec;

pub const CURSOR_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CursorToken {
    v: u32,
    #[serde(rename = "s")]
    sort_values: Vec<Value>,
    #[serde(rename = "f")]
    fingerprint: String,
}

/// Fingerprint of the context a cursor is valid in.
pub fn fingerprint(index: &str, sort: &SortSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.as_bytes());
    hasher.update(b"\n");
    hasher.update(sort.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    // 64 bits are plenty to tell contexts apart
    digest[..16].to_string()
}

/// Encode the position after a hit with `sort_values`.
pub fn encode(index: &str, sort: &SortSpec, sort_values: Vec<Value>) -> String {
    let token = CursorToken {
        v: CURSOR_VERSION,
        sort_values,
        fingerprint: fingerprint(index, sort),
    };
    // Serializing plain JSON values cannot fail
    let json = serde_json::to_vec(&token).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a cursor and check it belongs to `index` and `sort`.
///
/// Returns the sort values to pass as `search_after`.
pub fn decode(cursor: &str, index: &str, sort: &SortSpec) -> Result<Vec<Value>, QueryError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim().trim_end_matches('='))
        .map_err(|_| QueryError::InvalidCursor("not a valid cursor token".to_string()))?;

    let version = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|v| v.get("v").and_then(Value::as_u64))
        .ok_or_else(|| QueryError::InvalidCursor("not a valid cursor token".to_string()))?;
    if version != u64::from(CURSOR_VERSION) {
        return Err(QueryError::InvalidCursor(format!(
            "unsupported cursor version {version}"
        )));
    }

    let token: CursorToken = serde_json::from_slice(&bytes)
        .map_err(|_| QueryError::InvalidCursor("malformed cursor".to_string()))?;
    if token.fingerprint != fingerprint(index, sort) {
        return Err(QueryError::InvalidCursor(
            "cursor was issued for a different index or sort order".to_string(),
        ));
    }
    if token.sort_values.len() != sort.fields().len() {
        return Err(QueryError::InvalidCursor(
            "cursor does not match the sort fields".to_string(),
        ));
    }
    Ok(token.sort_values)
}
