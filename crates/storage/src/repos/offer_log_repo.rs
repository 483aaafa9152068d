//! OfferLogRepo: append-mostly analytics log of offers.

use core_types::{OfferLog, StorageKey};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{QueryFilter, StorageError, StorageIndexes, StorageService};

pub struct OfferLogRepo {
	storage: Arc<StorageService>,
}

impl OfferLogRepo {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn insert(&self, log: &OfferLog) -> Result<(), StorageError> {
		let indexes = StorageIndexes::new().with_field("task_id", &log.task_id);
		self.storage
			.store(StorageKey::OfferLogs.as_str(), &log.id, log, Some(indexes))
			.await
	}

	pub async fn save(&self, log: &OfferLog) -> Result<(), StorageError> {
		self.insert(log).await
	}

	/// The most recently created offer log for `task_id`.
	pub async fn latest_for_task(&self, task_id: &str) -> Result<Option<OfferLog>, StorageError> {
		let filter = QueryFilter::Equals(
			"task_id".to_string(),
			serde_json::Value::String(task_id.to_string()),
		);
		let mut items: Vec<(String, OfferLog)> =
			self.storage.query(StorageKey::OfferLogs.as_str(), filter).await?;
		items.sort_by_key(|(_, log)| log.created_at);
		Ok(items.into_iter().map(|(_, log)| log).last())
	}
}

/// Current time in unix millis.
pub fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}
