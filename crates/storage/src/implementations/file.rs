//! File-based storage backend.
//!
//! One JSON blob per key under `base_dir/<namespace>/<id>.json`, plus a
//! sidecar `.meta.json` carrying the index fields and expiry timestamp
//! (unix millis, 0 = never). Simpler than the teacher's binary-header
//! file backend (`solver-storage/src/implementations/file.rs`) but grounded
//! on the same shape: persistence for the same `StorageInterface` contract,
//! traded for less machinery since this core has no concurrent-writer
//! fsync requirements beyond what a single `tokio::sync::Mutex` gives it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;

use crate::{QueryFilter, StorageError, StorageIndexes, StorageInterface};

#[derive(Serialize, Deserialize, Default)]
struct Meta {
	indexes: HashMap<String, serde_json::Value>,
	expires_at_ms: u64,
}

impl Meta {
	fn is_expired(&self, now_ms: u64) -> bool {
		self.expires_at_ms != 0 && self.expires_at_ms <= now_ms
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

/// File-backed storage implementation. A single in-process `Mutex` guards
/// all operations; this backend is meant for a single-instance deployment
/// or for sharing state across restarts of the same process, not for
/// multi-writer coordination (that remains a database's job per spec §5).
pub struct FileStorage {
	base_dir: PathBuf,
	lock: Arc<Mutex<()>>,
}

impl FileStorage {
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		Self {
			base_dir: base_dir.into(),
			lock: Arc::new(Mutex::new(())),
		}
	}

	fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
		let safe = key.replace(['/', '\\'], "_");
		(
			self.base_dir.join(format!("{}.json", safe)),
			self.base_dir.join(format!("{}.meta.json", safe)),
		)
	}

	async fn read_meta(meta_path: &Path) -> Meta {
		match fs::read(meta_path).await {
			Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
			Err(_) => Meta::default(),
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let _g = self.lock.lock().await;
		let (data_path, meta_path) = self.paths(key);
		let meta = Self::read_meta(&meta_path).await;
		if meta.is_expired(now_ms()) {
			return Err(StorageError::NotFound);
		}
		fs::read(&data_path)
			.await
			.map_err(|_| StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		indexes: Option<StorageIndexes>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let _g = self.lock.lock().await;
		fs::create_dir_all(&self.base_dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		let (data_path, meta_path) = self.paths(key);
		fs::write(&data_path, &value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		let meta = Meta {
			indexes: indexes.map(|i| i.fields).unwrap_or_default(),
			expires_at_ms: ttl.map(|d| now_ms() + d.as_millis() as u64).unwrap_or(0),
		};
		let meta_bytes =
			serde_json::to_vec(&meta).map_err(|e| StorageError::Serialization(e.to_string()))?;
		fs::write(&meta_path, meta_bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _g = self.lock.lock().await;
		let (data_path, meta_path) = self.paths(key);
		let _ = fs::remove_file(&data_path).await;
		let _ = fs::remove_file(&meta_path).await;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let _g = self.lock.lock().await;
		let (data_path, meta_path) = self.paths(key);
		if !data_path.exists() {
			return Ok(false);
		}
		let meta = Self::read_meta(&meta_path).await;
		Ok(!meta.is_expired(now_ms()))
	}

	async fn query(
		&self,
		namespace: &str,
		filter: QueryFilter,
	) -> Result<Vec<String>, StorageError> {
		let _g = self.lock.lock().await;
		let mut out = Vec::new();
		let mut entries = match fs::read_dir(&self.base_dir).await {
			Ok(e) => e,
			Err(_) => return Ok(out),
		};
		let now = now_ms();
		let prefix = format!("{}:", namespace);
		while let Ok(Some(entry)) = entries.next_entry().await {
			let name = entry.file_name().to_string_lossy().to_string();
			if name.ends_with(".meta.json") {
				continue;
			}
			let Some(id_part) = name
				.strip_prefix(&prefix)
				.and_then(|n| n.strip_suffix(".json"))
			else {
				continue;
			};
			let key = format!("{}:{}", namespace, id_part);
			let (_, meta_path) = self.paths(&key);
			let meta = Self::read_meta(&meta_path).await;
			if meta.is_expired(now) {
				continue;
			}
			let matches = match &filter {
				QueryFilter::All => true,
				QueryFilter::Equals(field, expected) => {
					meta.indexes.get(field).map(|v| v == expected).unwrap_or(false)
				}
			};
			if matches {
				out.push(key);
			}
		}
		out.sort();
		Ok(out)
	}

	async fn get_batch(&self, keys: &[String]) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let mut results = Vec::new();
		for key in keys {
			if let Ok(bytes) = self.get_bytes(key).await {
				results.push((key.clone(), bytes));
			}
		}
		Ok(results)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let _g = self.lock.lock().await;
		let mut removed = 0;
		let mut entries = match fs::read_dir(&self.base_dir).await {
			Ok(e) => e,
			Err(_) => return Ok(0),
		};
		let now = now_ms();
		while let Ok(Some(entry)) = entries.next_entry().await {
			let name = entry.file_name().to_string_lossy().to_string();
			let Some(base) = name.strip_suffix(".meta.json") else {
				continue;
			};
			let meta_path = self.base_dir.join(&name);
			let meta = Self::read_meta(&meta_path).await;
			if meta.is_expired(now) {
				let data_path = self.base_dir.join(format!("{}.json", base));
				let _ = fs::remove_file(&data_path).await;
				let _ = fs::remove_file(&meta_path).await;
				removed += 1;
			}
		}
		Ok(removed)
	}
}
