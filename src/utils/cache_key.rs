//! Stable cache keys for the research pipeline.
//!
//! Uses a canonical JSON encoding (sorted keys, no spaces) of the input
//! shape, hashed with SHA-256 and prefixed with a namespace. Never include
//! clock or randomness in the key.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Canonicalize a serializable value: sort object keys recursively and
/// serialize with no extraneous whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    let v = serde_json::to_value(value).expect("value must serialize");
    canonicalize(&v).to_string()
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(sorted)
        },
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize).collect())
        },
        other => other.clone(),
    }
}

/// Namespaced SHA-256 cache key over the canonical encoding of `value`.
pub fn cache_key<T: Serialize>(namespace: &str, value: &T) -> String {
    let canon = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    let digest = hasher.finalize();
    format!("{namespace}{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(cache_key("enrich_company:", &a), cache_key("enrich_company:", &b));
    }

    #[test]
    fn key_differs_by_namespace() {
        let a = json!({"x": 1});
        assert_ne!(cache_key("enrich_company:", &a), cache_key("process_company:", &a));
    }

    #[test]
    fn key_differs_by_value() {
        assert_ne!(
            cache_key("enrich_company:", &json!({"x": 1})),
            cache_key("enrich_company:", &json!({"x": 2}))
        );
    }
}
