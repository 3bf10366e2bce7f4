use std::collections::BTreeMap;
use std::iter::FromIterator;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::errors::{ErrorInfo, MemoError};

fn serde_error(code: &str, err: impl ToString) -> MemoError {
    MemoError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn canonicalize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            JsonValue::Object(Map::from_iter(ordered))
        }
        JsonValue::Array(values) => {
            let canonical_values = values.into_iter().map(canonicalize).collect();
            JsonValue::Array(canonical_values)
        }
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic key ordering.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, MemoError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    let canonical = canonicalize(value);
    let mut bytes = Vec::new();
    serde_json::to_writer(&mut bytes, &canonical).map_err(|err| serde_error("json_write", err))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_are_sorted() {
        let a = json!({"b": {"y": 1, "x": 2}, "a": [ {"d": 1, "c": 2} ]});
        let bytes = to_canonical_json_bytes(&a).expect("canonical");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"a":[{"c":2,"d":1}],"b":{"x":2,"y":1}}"#
        );
    }
}
