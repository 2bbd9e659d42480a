//! JSON extraction helper for LLM responses.
//!
//! The LLM is asked for JSON but does not always deliver a clean payload —
//! markdown fences, leading prose, trailing commentary. Strict parse first,
//! then fall back to slicing between the first `{` and the last `}`.

use serde_json::Value;

/// Try strict parse; on failure, locate the first `{` and last `}` and retry.
/// Returns `None` if still invalid.
pub fn extract_json(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<Value>(&raw[start..=end]).ok()
}

/// Coerce a people-extraction payload into an ordered sequence of person
/// objects, accepting `{people:[...]}`, `[...]`, or `{results:[...]}` — the
/// first matching shape wins, and non-object items are dropped.
pub fn coerce_people_array(payload: &Value) -> Vec<Value> {
    let array = if let Some(arr) = payload.get("people").and_then(Value::as_array) {
        arr
    } else if let Some(arr) = payload.as_array() {
        arr
    } else if let Some(arr) = payload.get("results").and_then(Value::as_array) {
        arr
    } else {
        return Vec::new();
    };

    array.iter().filter(|v| v.is_object()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_parse_succeeds() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn brace_slice_recovers_from_prose() {
        let raw = "Sure, here you go:\n```json\n{\"a\": 1}\n```\nhope that helps";
        let v = extract_json(raw).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn unrecoverable_returns_none() {
        assert!(extract_json("not json at all").is_none());
    }

    #[test]
    fn coerce_people_object_shape() {
        let v = json!({"people": [{"name": "Jane"}, "not an object"]});
        let out = coerce_people_array(&v);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn coerce_people_bare_array_shape() {
        let v = json!([{"name": "Jane"}]);
        assert_eq!(coerce_people_array(&v).len(), 1);
    }

    #[test]
    fn coerce_people_results_shape() {
        let v = json!({"results": [{"name": "Jane"}]});
        assert_eq!(coerce_people_array(&v).len(), 1);
    }

    #[test]
    fn coerce_people_unknown_shape_is_empty() {
        let v = json!({"other": []});
        assert!(coerce_people_array(&v).is_empty());
    }
}
