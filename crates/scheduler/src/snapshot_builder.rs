//! Assembles a `dispatch::DispatchSnapshot` from persisted state.
//!
//! Grounded on `original_source/packages/dispatch/snapshot.py`'s
//! `build_dispatch_snapshot`, including its prep/SLA constants.

use std::collections::HashSet;
use std::sync::Arc;

use dispatch::{DispatchParams, DispatchSnapshot, Job};
use storage::repos::{DriverRepo, OrderRepo, TaskRepo};
use storage::StorageError;

use crate::geocode::GeoDirectory;

/// Minutes a store is assumed to need to prepare an order before it's
/// ready for pickup, matching `snapshot.py::DEFAULT_PREP_S`.
const DEFAULT_PREP_S: u64 = 5 * 60;
/// Delivery SLA from order creation, matching `snapshot.py::DEFAULT_SLA_S`.
const DEFAULT_SLA_S: u64 = 45 * 60;
/// Placeholder drop-leg ETA used until a job is matched and routed.
const DEFAULT_APPROX_ETA_DROP_S: u32 = 600;

pub struct SnapshotBuilder {
	order_repo: Arc<OrderRepo>,
	task_repo: Arc<TaskRepo>,
	driver_repo: Arc<DriverRepo>,
	geo: Arc<dyn GeoDirectory>,
	params: DispatchParams,
}

impl SnapshotBuilder {
	pub fn new(
		order_repo: Arc<OrderRepo>,
		task_repo: Arc<TaskRepo>,
		driver_repo: Arc<DriverRepo>,
		geo: Arc<dyn GeoDirectory>,
		params: DispatchParams,
	) -> Self {
		Self { order_repo, task_repo, driver_repo, geo, params }
	}

	pub async fn build(&self, now_ms: u64) -> Result<DispatchSnapshot, StorageError> {
		let drivers = self.driver_repo.all().await?;
		let orders = self.order_repo.pending_dispatch().await?;

		let mut active_order_ids = HashSet::new();
		let mut jobs = Vec::with_capacity(orders.len());

		for order in orders {
			let tasks = self.task_repo.by_order(&order.id).await?;
			if tasks.iter().any(|t| t.status.is_active()) {
				active_order_ids.insert(order.id.clone());
			}

			let Some(pickup) = self.geo.store_location(&order.store_id).await else {
				continue;
			};
			let Some(drop) = self.geo.address_location(&order.id, &order.address).await else {
				continue;
			};

			jobs.push(Job {
				order_id: order.id.clone(),
				job_id: format!("job_{}", order.id),
				pickup_lat: pickup.lat,
				pickup_lng: pickup.lng,
				drop_lat: drop.lat,
				drop_lng: drop.lng,
				zone_id: None,
				ready_at_ms: order.created_at + DEFAULT_PREP_S * 1000,
				deadline_ms: order.created_at + DEFAULT_SLA_S * 1000,
				payout_cents_est: (order.total as f64 * 0.25).max(500.0) as i64,
				approx_eta_drop_s: DEFAULT_APPROX_ETA_DROP_S,
			});
		}

		Ok(DispatchSnapshot { ts_ms: now_ms, drivers, jobs, active_order_ids, params: self.params })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use adapters::router::LatLng;
	use core_types::{Order, OrderStatus, PaymentStatus};
	use std::sync::Arc as StdArc;
	use storage::implementations::memory::MemoryStorage;
	use storage::StorageService;

	fn order(id: &str) -> Order {
		Order {
			id: id.to_string(),
			customer_id: "cust_1".to_string(),
			store_id: "store_1".to_string(),
			address: "123 main st".to_string(),
			status: OrderStatus::Dispatching,
			disclosure_version: "v1".to_string(),
			subtotal: 1000,
			tax: 82,
			fees: 299,
			tip: 0,
			total: 1381,
			payment_status: PaymentStatus::Authorized,
			items: vec![],
			created_at: 0,
		}
	}

	#[tokio::test]
	async fn builds_jobs_for_geocoded_orders_only() {
		let storage = StdArc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let order_repo = StdArc::new(OrderRepo::new(storage.clone()));
		let task_repo = StdArc::new(TaskRepo::new(storage.clone()));
		let driver_repo = StdArc::new(DriverRepo::new(storage.clone()));

		order_repo.insert(&order("ord_1")).await.unwrap();
		order_repo.insert(&order("ord_2")).await.unwrap();

		let geo = StdArc::new(
			crate::geocode::StaticGeoDirectory::new()
				.with_store("store_1", LatLng { lat: 30.0, lng: -97.0 })
				.with_order_address("ord_1", LatLng { lat: 30.1, lng: -97.1 }),
		);

		let builder = SnapshotBuilder::new(order_repo, task_repo, driver_repo, geo, DispatchParams::default());
		let snapshot = builder.build(0).await.unwrap();

		assert_eq!(snapshot.jobs.len(), 1);
		assert_eq!(snapshot.jobs[0].order_id, "ord_1");
	}
}
