//! Content index flattening.
//!
//! The content index maps languages and categories to lists of content URLs,
//! nested to any depth, e.g. `{"fr": {"books": ["/bible/fr/genese.json"]}}`.

use lampstand_core::Error;
use serde_json::Value;

/// Parse a content index document and flatten it.
pub fn parse_content_index(bytes: &[u8]) -> Result<Vec<String>, Error> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidManifest(format!("content index: {e}")))?;

    if !matches!(value, Value::Object(_) | Value::Array(_)) {
        return Err(Error::InvalidManifest("content index must be an object or an array".into()));
    }

    Ok(flatten_content_index(&value))
}

/// Collect every non-empty string in the index, depth first, in document order.
///
/// Numbers, booleans and nulls are skipped. Duplicates are kept; callers
/// de-duplicate after normalization.
pub fn flatten_content_index(value: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    collect(value, &mut urls);
    urls
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect(item, out)),
        _ => {}
    }
}
