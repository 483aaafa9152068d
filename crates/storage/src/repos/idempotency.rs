//! IdempotencyStore: at-most-once execution of mutating HTTP operations.
//!
//! Grounded on `original_source/packages/common/idempotency.py::get_or_set`.
//! `compute` is the "coroutine control flow" pattern spec.md §9 calls out:
//! run this work iff it hasn't already been recorded for `(key, route)`.

use core_types::{canonical_json, sha256_hex, ApiError, IdempotencyRecord, StorageKey};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::{StorageIndexes, StorageService};

/// Default retention for idempotency records: recommended "≥ 24 h" by
/// spec.md §9's open question.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// At-most-once execution of mutating operations keyed by
/// `(Idempotency-Key, route)`.
pub struct IdempotencyStore {
	storage: Arc<StorageService>,
	locks: DashMap<String, Arc<Mutex<()>>>,
	retention: Duration,
}

impl IdempotencyStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self::with_retention(storage, DEFAULT_RETENTION)
	}

	pub fn with_retention(storage: Arc<StorageService>, retention: Duration) -> Self {
		Self {
			storage,
			locks: DashMap::new(),
			retention,
		}
	}

	fn record_id(key: &str, route: &str) -> String {
		format!("{}::{}", key, route)
	}

	fn lock_for(&self, record_id: &str) -> Arc<Mutex<()>> {
		self.locks
			.entry(record_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// Looks up `(key, route)`; on a hit with matching `request_hash`,
	/// replays the stored `(status, response)`. On a hit with a mismatched
	/// hash, fails with 409 `IDEMPOTENCY_CONFLICT` without invoking
	/// `compute`. On a miss, invokes `compute`, persists the result, and
	/// returns it with `replayed = false`.
	pub async fn get_or_set<Req, Resp, F, Fut>(
		&self,
		key: &str,
		route: &str,
		request_body: &Req,
		compute: F,
	) -> Result<(u16, Resp, bool), ApiError>
	where
		Req: Serialize,
		Resp: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<(u16, Resp), ApiError>>,
	{
		if key.trim().is_empty() {
			return Err(ApiError::BadRequest {
				error_type: "IDEMPOTENCY_KEY_REQUIRED".to_string(),
				message: "Idempotency-Key is required".to_string(),
			});
		}

		let request_hash = sha256_hex(&canonical_json(request_body));
		let record_id = Self::record_id(key, route);
		let lock = self.lock_for(&record_id);
		let _guard = lock.lock().await;

		if let Ok(existing) = self
			.storage
			.retrieve::<IdempotencyRecord>(StorageKey::Idempotency.as_str(), &record_id)
			.await
		{
			if existing.request_hash != request_hash {
				return Err(ApiError::Conflict {
					error_type: "IDEMPOTENCY_CONFLICT".to_string(),
					message: "Idempotency-Key reuse with a different request body".to_string(),
				});
			}
			let response: Resp = serde_json::from_value(existing.response).map_err(|e| {
				ApiError::Internal {
					message: format!("failed to deserialize replayed response: {}", e),
				}
			})?;
			return Ok((existing.status_code, response, true));
		}

		let (status_code, response) = compute().await?;
		let response_json = serde_json::to_value(&response).map_err(|e| ApiError::Internal {
			message: format!("failed to serialize response: {}", e),
		})?;

		let record = IdempotencyRecord {
			key: key.to_string(),
			route: route.to_string(),
			request_hash,
			status_code,
			response: response_json,
			created_at: SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.unwrap_or_default()
				.as_secs(),
		};

		let indexes = StorageIndexes::new().with_field("route", route);
		self.storage
			.store_with_ttl(
				StorageKey::Idempotency.as_str(),
				&record_id,
				&record,
				Some(indexes),
				Some(self.retention),
			)
			.await
			.map_err(|e| ApiError::Internal {
				message: e.to_string(),
			})?;

		Ok((status_code, response, false))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;
	use serde_json::json;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[derive(Serialize, Deserialize, PartialEq, Debug)]
	struct Resp {
		ok: bool,
	}

	fn new_store() -> IdempotencyStore {
		IdempotencyStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[tokio::test]
	async fn replays_identical_request() {
		let store = new_store();
		let calls = Arc::new(AtomicU32::new(0));
		let body = json!({"a": 1});

		for _ in 0..2 {
			let calls = calls.clone();
			let (status, resp, replayed) = store
				.get_or_set("key1", "verify_age", &body, || async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok((200u16, Resp { ok: true }))
				})
				.await
				.unwrap();
			assert_eq!(status, 200);
			assert_eq!(resp, Resp { ok: true });
			let _ = replayed;
		}
		assert_eq!(calls.load(Ordering::SeqCst), 1, "compute must run at most once");
	}

	#[tokio::test]
	async fn conflicting_body_is_rejected() {
		let store = new_store();
		store
			.get_or_set("key1", "verify_age", &json!({"a": 1}), || async {
				Ok((200u16, Resp { ok: true }))
			})
			.await
			.unwrap();

		let err = store
			.get_or_set("key1", "verify_age", &json!({"a": 2}), || async {
				Ok((200u16, Resp { ok: true }))
			})
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 409);
	}

	#[tokio::test]
	async fn empty_key_is_rejected() {
		let store = new_store();
		let err = store
			.get_or_set("", "verify_age", &json!({}), || async {
				Ok((200u16, Resp { ok: true }))
			})
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 400);
	}
}
