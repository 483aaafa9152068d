//! DriverRepo: persistence contract for `Driver`.

use core_types::{Driver, DriverStatus, StorageKey};
use std::sync::Arc;

use crate::{QueryFilter, StorageError, StorageIndexes, StorageService};

pub struct DriverRepo {
	storage: Arc<StorageService>,
}

impl DriverRepo {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn upsert(&self, driver: &Driver) -> Result<(), StorageError> {
		let indexes =
			StorageIndexes::new().with_field("status", format!("{:?}", driver.status));
		self.storage
			.store(StorageKey::Drivers.as_str(), &driver.id, driver, Some(indexes))
			.await
	}

	pub async fn get(&self, driver_id: &str) -> Result<Driver, StorageError> {
		self.storage
			.retrieve(StorageKey::Drivers.as_str(), driver_id)
			.await
	}

	/// All drivers currently `Idle`, used to build a dispatch snapshot.
	pub async fn idle(&self) -> Result<Vec<Driver>, StorageError> {
		let filter = QueryFilter::Equals(
			"status".to_string(),
			serde_json::Value::String(format!("{:?}", DriverStatus::Idle)),
		);
		let items: Vec<(String, Driver)> =
			self.storage.query(StorageKey::Drivers.as_str(), filter).await?;
		Ok(items.into_iter().map(|(_, d)| d).collect())
	}

	pub async fn all(&self) -> Result<Vec<Driver>, StorageError> {
		let items: Vec<(String, Driver)> = self.storage.retrieve_all(StorageKey::Drivers.as_str()).await?;
		Ok(items.into_iter().map(|(_, d)| d).collect())
	}
}
