//! Stable JSON hashing and fingerprint derivation.

use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Serializes a JSON value with recursively sorted object keys so that two
/// semantically identical payloads hash identically regardless of key order.
/// Array order is preserved.
pub fn stable_stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stable_stringify).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String((*k).clone()),
                        stable_stringify(&map[k.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

pub fn stable_hash(value: &Value) -> String {
    sha256_hex(&stable_stringify(value))
}

/// Soft duplicate-detection signal. Never enforced as a constraint; used only
/// to spot repeat submissions from the same client for the same boat and day.
pub fn fingerprint(ip: &str, user_agent: &str, boat_slug: &str, utc_date_stamp: &str) -> String {
    stable_hash(&serde_json::json!({
        "ip": ip,
        "ua": user_agent,
        "boat": boat_slug,
        "day": utc_date_stamp,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_hash() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":[3,4]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":[3,4],"y":2},"b":1}"#).unwrap();
        assert_eq!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(stable_hash(&json!([1, 2])), stable_hash(&json!([2, 1])));
    }

    #[test]
    fn stable_stringify_quotes_like_json() {
        let v = json!({"name": "Ana", "n": 2, "ok": true, "none": null});
        assert_eq!(
            stable_stringify(&v),
            r#"{"n":2,"name":"Ana","none":null,"ok":true}"#
        );
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("10.0.0.1", "Mozilla/5.0", "bavaria-38", "2025-07-01");
        let b = fingerprint("10.0.0.1", "Mozilla/5.0", "bavaria-38", "2025-07-01");
        let c = fingerprint("10.0.0.2", "Mozilla/5.0", "bavaria-38", "2025-07-01");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
