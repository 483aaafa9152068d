//! OfferManager: the task-offer lifecycle a dispatched driver walks
//! through — offered, accepted/rejected, started, completed — plus the
//! periodic expiry sweep.
//!
//! Grounded on `original_source/apps/api/routers/tasks.py` (offer, accept,
//! reject, start, complete, return/complete) and
//! `original_source/packages/dispatch/expire.py` (`expire_offers`). The
//! advisory-lock dance in `expire.py` is a Postgres-only concern; here the
//! sweep is expected to run on a single scheduler task (see the
//! `scheduler` crate), so no equivalent lock is needed.

use std::sync::Arc;

use core_types::{ActorType, ApiError, DeliveryTask, DriverStatus, OfferLog, OfferOutcome, OrderStatus, TaskStatus};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use storage::repos::{DriverRepo, EventLog, IdempotencyStore, OfferLogRepo, OrderRepo, TaskRepo};
use storage::StorageError;
use tokio::sync::Mutex as AsyncMutex;

use crate::state_machine::try_transition;
use crate::time::now_ms;

const ROUTE_ACCEPT_TASK: &str = "POST:/tasks/{task_id}/accept";

/// Default offer time-to-live, matching `tasks.py::offer_task`'s
/// two-minute window.
pub const DEFAULT_OFFER_TTL_MS: u64 = 2 * 60 * 1000;

fn storage_err(e: StorageError) -> ApiError {
	match e {
		StorageError::NotFound => ApiError::NotFound {
			error_type: "TASK_NOT_FOUND".to_string(),
			message: "task not found".to_string(),
		},
		other => ApiError::Internal {
			message: other.to_string(),
		},
	}
}

fn event_err<E: std::fmt::Display>(e: E) -> ApiError {
	ApiError::Internal {
		message: e.to_string(),
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptTaskRequest {
	pub driver_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptTaskResponse {
	pub task_id: String,
	pub status: TaskStatus,
}

#[derive(Debug, Default, Serialize)]
pub struct ExpirySweepResult {
	pub expired_tasks: usize,
	pub updated_offer_logs: usize,
}

/// Manages the offer/accept/reject/start/complete lifecycle of
/// [`DeliveryTask`]s, independent of how a driver was chosen (that's the
/// `dispatch` crate's job).
pub struct OfferManager {
	tasks: Arc<TaskRepo>,
	orders: Arc<OrderRepo>,
	offer_logs: Arc<OfferLogRepo>,
	events: Arc<EventLog>,
	idempotency: Arc<IdempotencyStore>,
	drivers: Arc<DriverRepo>,
	/// Per-task `task_accept:{task_id}` locks serializing concurrent
	/// accepts of the same task across different idempotency keys — the
	/// `IdempotencyStore`'s own lock only serializes retries of the
	/// *same* key, which does nothing for two distinct drivers racing on
	/// one task.
	accept_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl OfferManager {
	pub fn new(
		tasks: Arc<TaskRepo>,
		orders: Arc<OrderRepo>,
		offer_logs: Arc<OfferLogRepo>,
		events: Arc<EventLog>,
		idempotency: Arc<IdempotencyStore>,
		drivers: Arc<DriverRepo>,
	) -> Self {
		Self {
			tasks,
			orders,
			offer_logs,
			events,
			idempotency,
			drivers,
			accept_locks: DashMap::new(),
		}
	}

	/// Best-effort driver-status flip: a driver holding an offer or an
	/// active task is no longer `Idle`, so the fast- and batch-tick
	/// eligibility filters (`candidates::driver_eligible`,
	/// `batch::pick_best_driver`) skip it for any other job. Tolerates a
	/// missing driver record (demo/test fixtures don't always seed one).
	async fn set_driver_status(&self, driver_id: &str, status: DriverStatus) {
		if let Ok(mut driver) = self.drivers.get(driver_id).await {
			driver.status = status;
			let _ = self.drivers.upsert(&driver).await;
		}
	}

	fn accept_lock(&self, task_id: &str) -> Arc<AsyncMutex<()>> {
		self.accept_locks
			.entry(task_id.to_string())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone()
	}

	/// Offers an `Unassigned` (or previously `Failed`) task to `driver_id`,
	/// recording a feature snapshot for later acceptance-model training.
	/// Not idempotent in the original source and not named in the
	/// idempotent-routes table, so this is a plain mutation.
	pub async fn create_offer(
		&self,
		task_id: &str,
		driver_id: &str,
		features: serde_json::Value,
		offer_ttl_ms: u64,
	) -> Result<DeliveryTask, ApiError> {
		let mut task = self.tasks.get(task_id).await.map_err(storage_err)?;
		if !matches!(task.status, TaskStatus::Unassigned | TaskStatus::Failed) {
			return Err(ApiError::Conflict {
				error_type: "INVALID_STATE".to_string(),
				message: format!("cannot offer task in status {:?}", task.status),
			});
		}

		let expires_at = now_ms() + offer_ttl_ms;
		task.status = TaskStatus::Offered;
		task.offered_to_driver_id = Some(driver_id.to_string());
		task.offer_expires_at = Some(expires_at);
		self.tasks.save(&task).await.map_err(storage_err)?;

		let log = OfferLog {
			id: format!("offlog_{}", uuid::Uuid::new_v4().simple()),
			task_id: task.id.clone(),
			order_id: task.order_id.clone(),
			driver_id: driver_id.to_string(),
			features,
			outcome: None,
			outcome_ms: None,
			response_latency_ms: None,
			created_at: now_ms(),
		};
		self.offer_logs.insert(&log).await.map_err(storage_err)?;

		self.events
			.append(
				&task.order_id,
				ActorType::System,
				"dispatch",
				"TASK_OFFERED",
				json!({"task_id": task.id, "driver_id": driver_id, "expires_at": expires_at}),
			)
			.await
			.map_err(event_err)?;

		self.set_driver_status(driver_id, DriverStatus::OnTask).await;

		Ok(task)
	}

	/// Driver accepts an offered task. Idempotent — a retried accept with
	/// the same key replays the stored response rather than re-running the
	/// state transition and order-status cascade.
	pub async fn accept_task(
		&self,
		idempotency_key: &str,
		task_id: &str,
		driver_id: &str,
	) -> Result<(u16, AcceptTaskResponse), ApiError> {
		// `task_accept:{task_id}`, TTL 10s: two concurrent accepts for the
		// same task must resolve to exactly one 200 and one 409. This is a
		// single non-blocking attempt rather than a blocking wait, so the
		// loser fails fast instead of queueing behind the winner.
		let lock = self.accept_lock(task_id);
		let _guard = lock.try_lock().map_err(|_| ApiError::Conflict {
			error_type: "TASK_ACCEPT_LOCKED".to_string(),
			message: "task is being accepted by another request".to_string(),
		})?;

		let request = AcceptTaskRequest {
			driver_id: driver_id.to_string(),
		};
		let task_id = task_id.to_string();
		let driver_id = driver_id.to_string();
		let tasks = self.tasks.clone();
		let orders = self.orders.clone();
		let offer_logs = self.offer_logs.clone();
		let events = self.events.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_ACCEPT_TASK, &request, move || async move {
				let mut task = tasks.get(&task_id).await.map_err(storage_err)?;
				if task.status != TaskStatus::Offered {
					return Err(ApiError::Conflict {
						error_type: "INVALID_STATE".to_string(),
						message: format!("task not offered (is {:?})", task.status),
					});
				}
				if task.offered_to_driver_id.as_deref() != Some(driver_id.as_str()) {
					return Err(ApiError::Forbidden {
						error_type: "NOT_OFFERED_TO_DRIVER".to_string(),
						message: "task not offered to this driver".to_string(),
					});
				}

				task.status = TaskStatus::Accepted;
				task.driver_id = Some(driver_id.clone());
				tasks.save(&task).await.map_err(storage_err)?;

				if let Ok(Some(mut log)) = offer_logs.latest_for_task(&task.id).await {
					log.outcome = Some(OfferOutcome::Accepted);
					log.outcome_ms = Some(now_ms());
					log.response_latency_ms = Some(now_ms().saturating_sub(log.created_at));
					let _ = offer_logs.save(&log).await;
				}

				events
					.append(
						&task.order_id,
						ActorType::Driver,
						&driver_id,
						"TASK_ACCEPTED",
						json!({"task_id": task.id, "driver_id": driver_id}),
					)
					.await
					.map_err(event_err)?;

				if let Ok(mut order) = orders.get(&task.order_id).await {
					if let Some(next) = try_transition(order.status, OrderStatus::Pickup) {
						order.status = next;
						if orders.save(&order).await.is_ok() {
							let _ = events
								.append(
									&order.id,
									ActorType::System,
									"dispatch",
									"ORDER_STATUS_UPDATED",
									json!({"to": order.status}),
								)
								.await;
						}
					}
				}

				Ok((
					200,
					AcceptTaskResponse {
						task_id: task.id.clone(),
						status: task.status,
					},
				))
			})
			.await?;

		Ok((status, resp))
	}

	/// Driver rejects an offered task, returning it to `Unassigned` so the
	/// next dispatch tick can re-offer it. Not idempotent in the original.
	pub async fn reject_task(&self, task_id: &str, driver_id: &str) -> Result<DeliveryTask, ApiError> {
		let mut task = self.tasks.get(task_id).await.map_err(storage_err)?;
		if task.status != TaskStatus::Offered {
			return Err(ApiError::Conflict {
				error_type: "INVALID_STATE".to_string(),
				message: format!("task not offered (is {:?})", task.status),
			});
		}
		if task.offered_to_driver_id.as_deref() != Some(driver_id) {
			return Err(ApiError::Forbidden {
				error_type: "NOT_OFFERED_TO_DRIVER".to_string(),
				message: "task not offered to this driver".to_string(),
			});
		}

		task.status = TaskStatus::Unassigned;
		task.offered_to_driver_id = None;
		task.offer_expires_at = None;
		self.tasks.save(&task).await.map_err(storage_err)?;

		if let Ok(Some(mut log)) = self.offer_logs.latest_for_task(&task.id).await {
			log.outcome = Some(OfferOutcome::Rejected);
			log.outcome_ms = Some(now_ms());
			log.response_latency_ms = Some(now_ms().saturating_sub(log.created_at));
			let _ = self.offer_logs.save(&log).await;
		}

		self.events
			.append(
				&task.order_id,
				ActorType::Driver,
				driver_id,
				"TASK_REJECTED",
				json!({"task_id": task.id}),
			)
			.await
			.map_err(event_err)?;

		self.set_driver_status(driver_id, DriverStatus::Idle).await;

		Ok(task)
	}

	/// Driver has picked up the order: `Accepted -> InProgress`, cascading
	/// the order through `Pickup -> EnRoute -> DoorstepVerify`.
	pub async fn start_task(&self, task_id: &str, driver_id: &str) -> Result<DeliveryTask, ApiError> {
		let mut task = self.tasks.get(task_id).await.map_err(storage_err)?;
		if task.status != TaskStatus::Accepted {
			return Err(ApiError::Conflict {
				error_type: "INVALID_STATE".to_string(),
				message: format!("cannot start task in status {:?}", task.status),
			});
		}
		if task.driver_id.as_deref() != Some(driver_id) {
			return Err(ApiError::Forbidden {
				error_type: "NOT_ASSIGNED_TO_DRIVER".to_string(),
				message: "task not assigned to this driver".to_string(),
			});
		}

		task.status = TaskStatus::InProgress;
		self.tasks.save(&task).await.map_err(storage_err)?;

		self.events
			.append(
				&task.order_id,
				ActorType::Driver,
				driver_id,
				"TASK_STARTED",
				json!({"task_id": task.id}),
			)
			.await
			.map_err(event_err)?;

		if let Ok(mut order) = self.orders.get(&task.order_id).await {
			let mut advanced = false;
			if let Some(next) = try_transition(order.status, OrderStatus::EnRoute) {
				order.status = next;
				advanced = true;
			}
			if let Some(next) = try_transition(order.status, OrderStatus::DoorstepVerify) {
				order.status = next;
				advanced = true;
			}
			if advanced {
				let _ = self.orders.save(&order).await;
				let _ = self
					.events
					.append(
						&order.id,
						ActorType::System,
						"dispatch",
						"ORDER_STATUS_UPDATED",
						json!({"to": order.status}),
					)
					.await;
			}
		}

		Ok(task)
	}

	/// Driver confirms delivery at the task level: `InProgress ->
	/// Completed`, cascading the order to `Delivered`.
	///
	/// Note: the customer-facing delivery confirmation with a doorstep
	/// attestation lives on `OrderService::deliver_confirm`, which already
	/// performs this order transition; this method exists for the
	/// driver-app task view and tolerates the order already being
	/// `Delivered` (the cascade is a no-op via `try_transition`).
	pub async fn complete_task(&self, task_id: &str, driver_id: &str) -> Result<DeliveryTask, ApiError> {
		let mut task = self.tasks.get(task_id).await.map_err(storage_err)?;
		if task.status != TaskStatus::InProgress {
			return Err(ApiError::Conflict {
				error_type: "INVALID_STATE".to_string(),
				message: format!("cannot complete task in status {:?}", task.status),
			});
		}
		if task.driver_id.as_deref() != Some(driver_id) {
			return Err(ApiError::Forbidden {
				error_type: "NOT_ASSIGNED_TO_DRIVER".to_string(),
				message: "task not assigned to this driver".to_string(),
			});
		}

		task.status = TaskStatus::Completed;
		self.tasks.save(&task).await.map_err(storage_err)?;

		self.events
			.append(
				&task.order_id,
				ActorType::Driver,
				driver_id,
				"TASK_COMPLETED",
				json!({"task_id": task.id}),
			)
			.await
			.map_err(event_err)?;

		if let Ok(mut order) = self.orders.get(&task.order_id).await {
			if let Some(next) = try_transition(order.status, OrderStatus::Delivered) {
				order.status = next;
				let _ = self.orders.save(&order).await;
				let _ = self
					.events
					.append(
						&order.id,
						ActorType::System,
						"dispatch",
						"ORDER_STATUS_UPDATED",
						json!({"to": order.status}),
					)
					.await;
			}
		}

		self.set_driver_status(driver_id, DriverStatus::Idle).await;

		Ok(task)
	}

	/// Marks a return task completed once the store confirms receipt.
	pub async fn complete_return(&self, task_id: &str) -> Result<DeliveryTask, ApiError> {
		let mut task = self.tasks.get(task_id).await.map_err(storage_err)?;
		if !matches!(
			task.status,
			TaskStatus::Accepted | TaskStatus::InProgress | TaskStatus::Offered | TaskStatus::Unassigned
		) {
			return Err(ApiError::Conflict {
				error_type: "INVALID_STATE".to_string(),
				message: format!("cannot complete task in status {:?}", task.status),
			});
		}

		task.status = TaskStatus::Completed;
		self.tasks.save(&task).await.map_err(storage_err)?;

		self.events
			.append(
				&task.order_id,
				ActorType::System,
				"dispatch",
				"RETURN_COMPLETED",
				json!({"return_task_id": task.id}),
			)
			.await
			.map_err(event_err)?;

		Ok(task)
	}

	/// Expires all `Offered` tasks whose `offer_expires_at` has passed,
	/// marking the latest offer log `Timeout` and the task `Expired` so
	/// the next dispatch tick can re-offer it. Intended to run on a single
	/// periodic scheduler task (see the `scheduler` crate); unlike the
	/// original's advisory-lock dance, no cross-process lock is needed
	/// here.
	pub async fn expire_offers(&self, limit: usize) -> Result<ExpirySweepResult, ApiError> {
		let now = now_ms();
		let expired = self.tasks.expired_offers(now, limit).await.map_err(storage_err)?;

		let mut result = ExpirySweepResult::default();
		for mut task in expired {
			task.status = TaskStatus::Expired;
			let driver_id = task.offered_to_driver_id.clone();
			self.tasks.save(&task).await.map_err(storage_err)?;
			result.expired_tasks += 1;

			self.events
				.append(
					&task.order_id,
					ActorType::System,
					"dispatch",
					"TASK_EXPIRED",
					json!({"task_id": task.id, "driver_id": driver_id, "expired_at": now}),
				)
				.await
				.map_err(event_err)?;

			if let Ok(Some(mut log)) = self.offer_logs.latest_for_task(&task.id).await {
				if log.outcome.is_none() {
					log.outcome = Some(OfferOutcome::Timeout);
					log.outcome_ms = Some(now);
					log.response_latency_ms = Some(now.saturating_sub(log.created_at));
					self.offer_logs.save(&log).await.map_err(storage_err)?;
					result.updated_offer_logs += 1;
				}
			}

			if let Some(driver_id) = driver_id {
				self.set_driver_status(&driver_id, DriverStatus::Idle).await;
			}
		}

		Ok(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use core_types::{Driver, DriverMetrics, DriverOnboardingStatus, Order, OrderItem, PaymentStatus, Route};
	use storage::implementations::memory::MemoryStorage;
	use storage::StorageService;

	fn new_manager() -> OfferManager {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		OfferManager::new(
			Arc::new(TaskRepo::new(storage.clone())),
			Arc::new(OrderRepo::new(storage.clone())),
			Arc::new(OfferLogRepo::new(storage.clone())),
			Arc::new(EventLog::new(storage.clone())),
			Arc::new(IdempotencyStore::new(storage.clone())),
			Arc::new(DriverRepo::new(storage.clone())),
		)
	}

	async fn seed_order_and_task(manager: &OfferManager, order_id: &str, task_id: &str) {
		let order = Order {
			id: order_id.to_string(),
			customer_id: "cust_1".to_string(),
			store_id: "store_1".to_string(),
			address: "1 Main St".to_string(),
			status: OrderStatus::Dispatching,
			disclosure_version: "v1".to_string(),
			subtotal: 1000,
			tax: 0,
			fees: 0,
			tip: 0,
			total: 1000,
			payment_status: PaymentStatus::Authorized,
			items: vec![OrderItem {
				product_id: "sku".to_string(),
				quantity: 1,
				unit_price: 1000,
				line_total: 1000,
			}],
			created_at: now_ms(),
		};
		manager.orders.insert(&order).await.unwrap();

		let task = DeliveryTask {
			id: task_id.to_string(),
			order_id: order_id.to_string(),
			status: TaskStatus::Unassigned,
			driver_id: None,
			offered_to_driver_id: None,
			offer_expires_at: None,
			route: Route::delivery(),
			created_at: now_ms(),
		};
		manager.tasks.insert(&task).await.unwrap();
	}

	async fn seed_idle_driver(manager: &OfferManager, driver_id: &str) {
		let driver = Driver {
			id: driver_id.to_string(),
			status: DriverStatus::Idle,
			onboarding_status: DriverOnboardingStatus::Active,
			lat: 30.27,
			lng: -97.74,
			zone_id: None,
			insurance_verified: true,
			registration_verified: true,
			vehicle_verified: true,
			background_clear: true,
			metrics: DriverMetrics::default(),
		};
		manager.drivers.upsert(&driver).await.unwrap();
	}

	#[tokio::test]
	async fn offer_accept_start_complete_cascades_order_status() {
		let manager = new_manager();
		seed_order_and_task(&manager, "ord_1", "task_1").await;

		manager
			.create_offer("task_1", "drv_1", json!({"ts_ms": 1}), DEFAULT_OFFER_TTL_MS)
			.await
			.unwrap();

		let (status, resp) = manager.accept_task("k1", "task_1", "drv_1").await.unwrap();
		assert_eq!(status, 200);
		assert_eq!(resp.status, TaskStatus::Accepted);

		let order = manager.orders.get("ord_1").await.unwrap();
		assert_eq!(order.status, OrderStatus::Pickup);

		let task = manager.start_task("task_1", "drv_1").await.unwrap();
		assert_eq!(task.status, TaskStatus::InProgress);
		let order = manager.orders.get("ord_1").await.unwrap();
		assert_eq!(order.status, OrderStatus::DoorstepVerify);

		let task = manager.complete_task("task_1", "drv_1").await.unwrap();
		assert_eq!(task.status, TaskStatus::Completed);
		let order = manager.orders.get("ord_1").await.unwrap();
		assert_eq!(order.status, OrderStatus::Delivered);
	}

	#[tokio::test]
	async fn reject_returns_task_to_unassigned() {
		let manager = new_manager();
		seed_order_and_task(&manager, "ord_2", "task_2").await;
		manager
			.create_offer("task_2", "drv_2", json!({}), DEFAULT_OFFER_TTL_MS)
			.await
			.unwrap();

		let task = manager.reject_task("task_2", "drv_2").await.unwrap();
		assert_eq!(task.status, TaskStatus::Unassigned);
		assert!(task.offered_to_driver_id.is_none());
	}

	#[tokio::test]
	async fn accept_by_wrong_driver_is_forbidden() {
		let manager = new_manager();
		seed_order_and_task(&manager, "ord_3", "task_3").await;
		manager
			.create_offer("task_3", "drv_3", json!({}), DEFAULT_OFFER_TTL_MS)
			.await
			.unwrap();

		let err = manager.accept_task("k1", "task_3", "drv_other").await.unwrap_err();
		assert_eq!(err.status_code(), 403);
	}

	#[tokio::test]
	async fn expire_offers_sweeps_past_due_offers() {
		let manager = new_manager();
		seed_order_and_task(&manager, "ord_4", "task_4").await;
		manager.create_offer("task_4", "drv_4", json!({}), 0).await.unwrap();

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		let result = manager.expire_offers(10).await.unwrap();
		assert_eq!(result.expired_tasks, 1);
		assert_eq!(result.updated_offer_logs, 1);

		let task = manager.tasks.get("task_4").await.unwrap();
		assert_eq!(task.status, TaskStatus::Expired);
	}

	#[tokio::test]
	async fn driver_leaves_idle_on_offer_and_returns_on_completion() {
		let manager = new_manager();
		seed_order_and_task(&manager, "ord_5", "task_5").await;
		seed_idle_driver(&manager, "drv_5").await;

		manager.create_offer("task_5", "drv_5", json!({}), DEFAULT_OFFER_TTL_MS).await.unwrap();
		let driver = manager.drivers.get("drv_5").await.unwrap();
		assert_eq!(driver.status, DriverStatus::OnTask);

		manager.accept_task("k1", "task_5", "drv_5").await.unwrap();
		manager.start_task("task_5", "drv_5").await.unwrap();
		manager.complete_task("task_5", "drv_5").await.unwrap();

		let driver = manager.drivers.get("drv_5").await.unwrap();
		assert_eq!(driver.status, DriverStatus::Idle);
	}

	#[tokio::test]
	async fn concurrent_accepts_on_the_same_task_yield_exactly_one_winner() {
		let manager = Arc::new(new_manager());
		seed_order_and_task(&manager, "ord_6", "task_6").await;
		manager.create_offer("task_6", "drv_6", json!({}), DEFAULT_OFFER_TTL_MS).await.unwrap();

		let m1 = manager.clone();
		let m2 = manager.clone();
		let (r1, r2) = tokio::join!(
			m1.accept_task("key_a", "task_6", "drv_6"),
			m2.accept_task("key_b", "task_6", "drv_6"),
		);

		let statuses: Vec<u16> = [r1, r2]
			.into_iter()
			.map(|r| match r {
				Ok((status, _)) => status,
				Err(e) => e.status_code(),
			})
			.collect();
		assert!(statuses.contains(&200));
		assert!(statuses.iter().filter(|s| **s == 200).count() == 1);
	}
}
