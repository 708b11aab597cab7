//! Canonical JSON and SHA-256 helpers for task fingerprints.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::error::Result;

/// Compact JSON with object keys sorted at every depth.
///
/// `serde_json::Map` is ordered by key unless `preserve_order` is enabled,
/// so a round trip through `Value` sorts the keys; arrays keep their order.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn compute_digest<T: Serialize>(value: &T) -> Result<String> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Loggable stand-in for a sensitive value: first 8 hex digits plus `...`.
pub fn hash_value(value: &str) -> String {
    let digest = sha256_hex(value.as_bytes());
    format!("{}...", &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_field_order_invariant() {
        let a = serde_json::json!({ "c": 3, "a": 1, "b": { "z": 1, "y": 2 } });
        let b = serde_json::json!({ "a": 1, "b": { "y": 2, "z": 1 }, "c": 3 });
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(canonical_json(&a).unwrap(), r#"{"a":1,"b":{"y":2,"z":1},"c":3}"#);
    }

    #[test]
    fn test_array_order_preserved() {
        let a = serde_json::json!({ "array": [3, 1, 2] });
        let b = serde_json::json!({ "array": [1, 2, 3] });
        assert_ne!(compute_digest(&a).unwrap(), compute_digest(&b).unwrap());
    }

    #[test]
    fn test_hash_value_truncates() {
        let hashed = hash_value("/opt/zulu-17");
        assert_eq!(hashed.len(), 11);
        assert!(hashed.ends_with("..."));
        assert!(!hashed.contains("zulu"));
        assert_eq!(hashed, hash_value("/opt/zulu-17"));
    }
}
