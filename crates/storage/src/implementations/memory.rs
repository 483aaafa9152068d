//! In-memory storage backend.
//!
//! Unlike the teacher's test-only `MemoryStorage` (which ignores indexes,
//! TTL, and querying), this implementation is the default backend the
//! service actually runs against, so it carries real TTL expiry and index
//! based querying — the teacher's pattern generalized to what the spec's
//! `OrderRepo`/`TaskRepo`/`DriverRepo` and `IdempotencyStore` need.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{QueryFilter, StorageError, StorageIndexes, StorageInterface};

struct Entry {
	value: Vec<u8>,
	indexes: HashMap<String, serde_json::Value>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|t| t <= now)
	}
}

/// In-memory storage implementation backed by a single `RwLock<HashMap>`.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

fn namespace_of(key: &str) -> &str {
	key.split_once(':').map(|(ns, _)| ns).unwrap_or(key)
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		let entry = store.get(key).ok_or(StorageError::NotFound)?;
		if entry.is_expired(Instant::now()) {
			return Err(StorageError::NotFound);
		}
		Ok(entry.value.clone())
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		indexes: Option<StorageIndexes>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(
			key.to_string(),
			Entry {
				value,
				indexes: indexes.map(|i| i.fields).unwrap_or_default(),
				expires_at: ttl.map(|d| Instant::now() + d),
			},
		);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|e| !e.is_expired(Instant::now())))
	}

	async fn query(
		&self,
		namespace: &str,
		filter: QueryFilter,
	) -> Result<Vec<String>, StorageError> {
		let store = self.store.read().await;
		let now = Instant::now();
		let mut out = Vec::new();
		for (key, entry) in store.iter() {
			if namespace_of(key) != namespace || entry.is_expired(now) {
				continue;
			}
			let matches = match &filter {
				QueryFilter::All => true,
				QueryFilter::Equals(field, expected) => {
					entry.indexes.get(field).map(|v| v == expected).unwrap_or(false)
				}
			};
			if matches {
				out.push(key.clone());
			}
		}
		out.sort();
		Ok(out)
	}

	async fn get_batch(&self, keys: &[String]) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let store = self.store.read().await;
		let now = Instant::now();
		let mut results = Vec::new();
		for key in keys {
			if let Some(entry) = store.get(key) {
				if !entry.is_expired(now) {
					results.push((key.clone(), entry.value.clone()));
				}
			}
		}
		Ok(results)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut store = self.store.write().await;
		let now = Instant::now();
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn set_get_delete_round_trip() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("k", b"v".to_vec(), None, None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v");
		assert!(storage.exists("k").await.unwrap());
		storage.delete("k").await.unwrap();
		assert!(matches!(
			storage.get_bytes("k").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn ttl_expiry_is_observed_on_read() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("k", b"v".to_vec(), None, Some(Duration::from_millis(1)))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(matches!(
			storage.get_bytes("k").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn query_matches_indexed_field() {
		let storage = MemoryStorage::new();
		let idx = StorageIndexes::new().with_field("order_id", "ord_1");
		storage
			.set_bytes("tasks:t1", b"{}".to_vec(), Some(idx), None)
			.await
			.unwrap();
		let keys = storage
			.query(
				"tasks",
				QueryFilter::Equals(
					"order_id".to_string(),
					serde_json::Value::String("ord_1".to_string()),
				),
			)
			.await
			.unwrap();
		assert_eq!(keys, vec!["tasks:t1".to_string()]);
	}
}
