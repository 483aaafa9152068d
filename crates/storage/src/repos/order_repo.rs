//! OrderRepo: persistence contract for `Order`.

use core_types::{Order, OrderStatus, StorageKey};
use std::sync::Arc;

use crate::{StorageError, StorageService};

pub struct OrderRepo {
	storage: Arc<StorageService>,
}

impl OrderRepo {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn insert(&self, order: &Order) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order, None)
			.await
	}

	pub async fn get(&self, order_id: &str) -> Result<Order, StorageError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
	}

	pub async fn save(&self, order: &Order) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order, None)
			.await
	}

	/// Orders still awaiting dispatch, i.e. created but not yet at or past
	/// `Dispatching`. Used to build a dispatch snapshot; filtered client
	/// side since orders aren't indexed by status.
	pub async fn pending_dispatch(&self) -> Result<Vec<Order>, StorageError> {
		let items: Vec<(String, Order)> = self.storage.retrieve_all(StorageKey::Orders.as_str()).await?;
		Ok(items
			.into_iter()
			.map(|(_, o)| o)
			.filter(|o| {
				matches!(
					o.status,
					OrderStatus::Created
						| OrderStatus::VerifyingAge
						| OrderStatus::PaymentAuth
						| OrderStatus::PendingMerchant
						| OrderStatus::MerchantAccepted
						| OrderStatus::Dispatching
				)
			})
			.collect())
	}
}
