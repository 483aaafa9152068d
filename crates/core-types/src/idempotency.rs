//! Idempotency record types.

use serde::{Deserialize, Serialize};

/// A stored result for a `(key, route)` pair, used to replay mutating HTTP
/// operations at most once.
///
/// Invariant: for a given `(key, route)`, every stored record shares the
/// same `request_hash`; a second call with a differing body is a client
/// error, not a second record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
	pub key: String,
	pub route: String,
	pub request_hash: String,
	pub status_code: u16,
	pub response: serde_json::Value,
	pub created_at: u64,
}
