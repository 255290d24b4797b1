//! Validation of JSON props before they are handed to the render function.
//!
//! Props are spliced into a script as a JSON literal, so they must be a
//! single well-formed JSON value. Keys that could pollute `Object.prototype`
//! in user code are refused, as is pathological nesting.

use serde_json::Value;

use crate::error::RuntimeError;

/// Maximum nesting depth for objects and arrays.
const MAX_DEPTH: usize = 32;

/// Keys that could be used for prototype pollution.
const DANGEROUS_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Parse and check a props document, returning its canonical JSON text.
///
/// # Errors
/// Returns [`RuntimeError::InvalidProps`] if:
/// - the text is not exactly one JSON value
/// - a dangerous key (`__proto__`, `constructor`, `prototype`) is present
/// - nesting depth exceeds `MAX_DEPTH` (32)
pub fn parse_props(json: &str) -> Result<String, RuntimeError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| RuntimeError::InvalidProps(format!("malformed JSON: {e}")))?;
    check(&value, 0)?;
    Ok(value.to_string())
}

fn check(value: &Value, depth: usize) -> Result<(), RuntimeError> {
    if depth > MAX_DEPTH {
        return Err(RuntimeError::InvalidProps(format!(
            "nesting too deep (max {MAX_DEPTH} levels)"
        )));
    }

    match value {
        Value::Object(map) => {
            if let Some(key) = map.keys().find(|k| DANGEROUS_KEYS.contains(&k.as_str())) {
                return Err(RuntimeError::InvalidProps(format!(
                    "'{key}' key is forbidden"
                )));
            }
            map.values().try_for_each(|v| check(v, depth + 1))
        }
        Value::Array(items) => items.iter().try_for_each(|v| check(v, depth + 1)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reason(result: Result<String, RuntimeError>) -> String {
        match result {
            Err(RuntimeError::InvalidProps(reason)) => reason,
            other => panic!("expected invalid props, got {other:?}"),
        }
    }

    #[test]
    fn test_safe_props() {
        let props = json!({
            "message": "Hello",
            "user": { "name": "Alice", "settings": { "theme": "dark" } },
            "items": [1, 2, {"nested": true}]
        });

        let parsed = parse_props(&props.to_string()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&parsed).unwrap(), props);
    }

    #[test]
    fn test_non_object_props_are_allowed() {
        assert_eq!(parse_props(" 42 ").unwrap(), "42");
        assert_eq!(parse_props("null").unwrap(), "null");
    }

    #[test]
    fn test_malformed_json() {
        assert!(reason(parse_props("{\"a\":")).contains("malformed"));
        assert!(reason(parse_props("{} ); evil(")).contains("malformed"));
    }

    #[test]
    fn test_blocks_proto() {
        assert!(reason(parse_props(r#"{"__proto__": {"polluted": true}}"#)).contains("__proto__"));
    }

    #[test]
    fn test_blocks_constructor() {
        assert!(reason(parse_props(r#"{"constructor": {"prototype": {}}}"#)).contains("constructor"));
    }

    #[test]
    fn test_blocks_nested_proto_in_array() {
        let props = json!({ "items": [{"safe": true}, {"prototype": 1}] });
        assert!(parse_props(&props.to_string()).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!({"leaf": true});
        for _ in 0..35 {
            value = json!({"nested": value});
        }
        assert!(reason(parse_props(&value.to_string())).contains("too deep"));
    }
}
