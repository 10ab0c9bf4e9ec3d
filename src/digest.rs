//! Canonical-JSON serialization and intent digests.
//!
//! The digest over the user-intent material is computed twice: once by the
//! engine when it emits a confirmation request, and once more before it uses
//! any credential from the decision. Both sides alphabetize keys recursively
//! so field ordering can never cause drift.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::encoders::base64_url_encode;
use crate::error::Result;

/// Recursively sort object keys so serialization is deterministic.
pub fn alphabetize_json_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                if let Some(child) = map.get(k) {
                    out.insert(k.clone(), alphabetize_json_value(child));
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(alphabetize_json_value).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 over the alphabetized canonical JSON, base64url encoded.
pub fn compute_intent_digest(value: &Value) -> Result<String> {
    let alphabetized = alphabetize_json_value(value);
    let serialized = serde_json::to_string(&alphabetized)?;

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(base64_url_encode(&hasher.finalize()))
}

/// SHA-256 over the alphabetized canonical JSON, raw bytes.
/// Used as the signing pre-hash for transaction signing requests.
pub fn compute_canonical_digest(value: &Value) -> Result<[u8; 32]> {
    let alphabetized = alphabetize_json_value(value);
    let serialized = serde_json::to_string(&alphabetized)?;

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    Ok(hash)
}

/// Generates a unique request ID for confirmation requests
pub fn generate_request_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", millis, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alphabetize_sorts_nested_keys() {
        let input = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        let sorted = alphabetize_json_value(&input);
        let serialized = serde_json::to_string(&sorted).unwrap();
        assert_eq!(serialized, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_digest_stable_under_key_order() {
        let one = json!({"receiverId": "bob.testnet", "actions": [{"deposit": "1", "kind": "Transfer"}]});
        let two = json!({"actions": [{"kind": "Transfer", "deposit": "1"}], "receiverId": "bob.testnet"});
        let d1 = compute_intent_digest(&one).unwrap();
        let d2 = compute_intent_digest(&two).unwrap();
        assert_eq!(d1, d2, "Key order must not change the digest");
    }

    #[test]
    fn test_digest_changes_with_content() {
        let one = json!({"receiverId": "bob.testnet"});
        let two = json!({"receiverId": "eve.testnet"});
        assert_ne!(
            compute_intent_digest(&one).unwrap(),
            compute_intent_digest(&two).unwrap()
        );
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }
}
