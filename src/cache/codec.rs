//! Value Codec
//!
//! Cache values are JSON documents (`serde_json::Value`): null, booleans,
//! numbers, strings and nested arrays/objects. They are stored as UTF-8 JSON
//! bytes in the `value` column and travel as JSON on the wire, so every node
//! reads what any other node wrote.

use serde_json::Value;

use crate::error::Result;

/// Encodes a value for the `value` column.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes a `value` column payload.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Reads a value as an integer counter.
///
/// Integral numbers and strings holding an integer count; fractions and
/// anything else are rejected.
pub fn as_counter(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
