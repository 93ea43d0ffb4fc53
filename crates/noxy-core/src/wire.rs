//! Helpers for the JSON payloads that arrive over the bus.
//!
//! Automation flows write field names in whatever case they like
//! (`Name`, `name`, `NAME`), so keys are folded to lower case before the
//! payload is deserialized into a struct declared with lower-case names.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::BridgeError;

/// Recursively lower-case every object key.
pub fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut folded = Map::with_capacity(map.len());
            for (key, val) in map {
                let _ = folded.insert(key.to_lowercase(), fold_keys(val));
            }
            Value::Object(folded)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(fold_keys).collect()),
        other => other,
    }
}

/// Parse a JSON payload with case-insensitive field names.
pub fn from_json_ci<T: DeserializeOwned>(payload: &str) -> Result<T, BridgeError> {
    let raw: Value = serde_json::from_str(payload)?;
    if !raw.is_object() {
        return Err(BridgeError::invalid("expected a JSON object"));
    }
    Ok(serde_json::from_value(fold_keys(raw))?)
}
