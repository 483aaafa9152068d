//! Canonical-JSON encoding and SHA-256 hashing for the dossier hash chain.
//!
//! Mirrors `original_source/packages/common/crypto.py::stable_json`: object
//! keys sorted lexicographically, no inter-token whitespace, UTF-8. The
//! Python original also takes a `default=str` fallback for values its
//! `json.dumps` can't natively represent (datetimes, UUIDs, Decimals);
//! that case doesn't arise here since every value first round-trips
//! through `Serialize`, and `serde_json::Value` itself has no variant for
//! anything that isn't already one of null/bool/number/string/array/object.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sorts object keys and renders `value` as minimal-whitespace
/// JSON bytes.
///
/// Arrays preserve element order (order is significant); only object keys
/// are sorted. This is the canonical form used both for `hash_self`
/// computation and for idempotency `request_hash` computation.
pub fn canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
	let v = serde_json::to_value(value).unwrap_or(Value::Null);
	let sorted = sort_value(v);
	serde_json::to_vec(&sorted).expect("canonical value always serializes")
}

fn sort_value(v: Value) -> Value {
	match v {
		Value::Object(map) => {
			let mut entries: Vec<(String, Value)> =
				map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
			entries.sort_by(|a, b| a.0.cmp(&b.0));
			let mut sorted = serde_json::Map::new();
			for (k, v) in entries {
				sorted.insert(k, v);
			}
			Value::Object(sorted)
		}
		Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
		other => other,
	}
}

/// Returns the lowercase hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(data);
	hex::encode(hasher.finalize())
}
