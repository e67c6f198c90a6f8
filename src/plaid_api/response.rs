use serde::Serialize;
use serde_json::Value;

use super::UpstreamError;

/// Take the array stored under `key` out of a serialized API response
pub fn records(response: &impl Serialize, key: &str) -> Result<Vec<Value>, UpstreamError> {
    let mut value = serde_json::to_value(response)?;
    match value.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) => Ok(vec![]),
        Some(other) => Err(UpstreamError::InvalidResponse(format!(
            "expected '{key}' to be an array, got {other}"
        ))),
    }
}
