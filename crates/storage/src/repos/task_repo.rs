//! TaskRepo: persistence contract for `DeliveryTask`.

use core_types::{DeliveryTask, StorageKey, TaskStatus};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{QueryFilter, StorageError, StorageIndexes, StorageService};

pub struct TaskRepo {
	storage: Arc<StorageService>,
}

impl TaskRepo {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	fn indexes(task: &DeliveryTask) -> StorageIndexes {
		StorageIndexes::new()
			.with_field("order_id", &task.order_id)
			.with_field("status", format!("{:?}", task.status))
	}

	pub async fn insert(&self, task: &DeliveryTask) -> Result<(), StorageError> {
		self.storage
			.store(
				StorageKey::Tasks.as_str(),
				&task.id,
				task,
				Some(Self::indexes(task)),
			)
			.await
	}

	pub async fn save(&self, task: &DeliveryTask) -> Result<(), StorageError> {
		self.insert(task).await
	}

	pub async fn get(&self, task_id: &str) -> Result<DeliveryTask, StorageError> {
		self.storage.retrieve(StorageKey::Tasks.as_str(), task_id).await
	}

	/// All tasks belonging to `order_id`.
	pub async fn by_order(&self, order_id: &str) -> Result<Vec<DeliveryTask>, StorageError> {
		let filter = QueryFilter::Equals(
			"order_id".to_string(),
			serde_json::Value::String(order_id.to_string()),
		);
		let items: Vec<(String, DeliveryTask)> =
			self.storage.query(StorageKey::Tasks.as_str(), filter).await?;
		Ok(items.into_iter().map(|(_, t)| t).collect())
	}

	/// The task currently in an active status for `order_id`, if any.
	/// Invariant (spec §3): at most one exists.
	pub async fn active_for_order(
		&self,
		order_id: &str,
	) -> Result<Option<DeliveryTask>, StorageError> {
		let tasks = self.by_order(order_id).await?;
		Ok(tasks.into_iter().find(|t| t.status.is_active()))
	}

	/// All tasks currently `Offered` with `offer_expires_at` at or before
	/// `now_ms`, used by the expiry sweep (spec §4.5).
	pub async fn expired_offers(
		&self,
		now_ms: u64,
		limit: usize,
	) -> Result<Vec<DeliveryTask>, StorageError> {
		let filter = QueryFilter::Equals(
			"status".to_string(),
			serde_json::Value::String(format!("{:?}", TaskStatus::Offered)),
		);
		let items: Vec<(String, DeliveryTask)> =
			self.storage.query(StorageKey::Tasks.as_str(), filter).await?;
		let mut out: Vec<DeliveryTask> = items
			.into_iter()
			.map(|(_, t)| t)
			.filter(|t| t.offer_expires_at.is_some_and(|exp| exp < now_ms))
			.collect();
		out.truncate(limit);
		Ok(out)
	}
}

/// Current time in unix millis, used throughout tasks/offers.
pub fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}
