//! Fast and batch dispatch ticks: turn a snapshot into committed offers.
//!
//! Grounded on `original_source/packages/dispatch/loops.py`'s `fast_tick`/
//! `batch_tick` orchestration, calling straight through to the pure
//! `dispatch` crate functions for candidate generation, scoring, and
//! assignment.

use std::collections::HashSet;
use std::sync::Arc;

use adapters::RouterAdapter;
use core_types::{ApiError, TaskStatus};
use dispatch::{
	candidates::generate_candidates, compute_cost, eta::refine_edges_with_router, solve_min_cost_flow, DispatchSnapshot,
};
use geo::DriverIndex;
use serde_json::json;
use storage::repos::TaskRepo;
use storage::StorageError;

use engine::OfferManager;

fn storage_err(e: StorageError) -> ApiError {
	ApiError::Internal { message: e.to_string() }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct TickResult {
	pub candidates: usize,
	pub matches: usize,
	pub offers_created: usize,
}

/// Runs one fast-tick iteration: candidate generation, router ETA
/// refinement, cost scoring, greedy assignment, and offer creation for
/// each job whose order already has an `Unassigned` delivery task.
pub async fn run_fast_tick(
	snapshot: &DispatchSnapshot,
	router: &dyn RouterAdapter,
	task_repo: &Arc<TaskRepo>,
	offers: &Arc<OfferManager>,
) -> Result<TickResult, ApiError> {
	let mut result = TickResult::default();
	if snapshot.pending_jobs().is_empty() {
		return Ok(result);
	}

	let index = DriverIndex::build(&snapshot.drivers, snapshot.params.h3_res);
	let approx_edges = generate_candidates(snapshot, Some(&index));
	result.candidates = approx_edges.len();

	let refined = refine_edges_with_router(snapshot, approx_edges, router).await;

	let scored: Vec<_> = refined
		.into_iter()
		.filter_map(|mut edge| {
			let driver = snapshot.drivers.iter().find(|d| d.id == edge.driver_id)?;
			let job = snapshot.jobs.iter().find(|j| j.job_id == edge.job_id)?;
			let (cost, _) = compute_cost(&snapshot.params.weights, snapshot.ts_ms, driver, job, edge.eta_pu_s, edge.eta_drop_s);
			edge.cost = Some(cost);
			Some(edge)
		})
		.collect();

	let matches = solve_min_cost_flow(&scored);
	result.matches = matches.len();

	for m in matches {
		let Some(job) = snapshot.jobs.iter().find(|j| j.job_id == m.job_id) else {
			continue;
		};
		let tasks = task_repo.by_order(&job.order_id).await.map_err(storage_err)?;
		let Some(task) = tasks.into_iter().find(|t| t.status == TaskStatus::Unassigned) else {
			continue;
		};

		offers
			.create_offer(
				&task.id,
				&m.driver_id,
				json!({"source": "fast_tick", "cost": m.cost}),
				snapshot.params.offer_ttl_s * 1000,
			)
			.await?;
		result.offers_created += 1;
	}

	Ok(result)
}

/// Runs one batch-tick iteration: cluster pending jobs, pick the nearest
/// eligible idle driver per cluster, and commit only the first stop of
/// each planned route as an offer.
pub async fn run_batch_tick(
	snapshot: &DispatchSnapshot,
	router: &dyn RouterAdapter,
	task_repo: &Arc<TaskRepo>,
	offers: &Arc<OfferManager>,
) -> Result<TickResult, ApiError> {
	let mut result = TickResult::default();
	let pending: Vec<_> = snapshot.pending_jobs().into_iter().cloned().collect();
	if pending.is_empty() {
		return Ok(result);
	}

	// Drivers holding an offer or an active task are already excluded from
	// `snapshot.drivers` by `driver.status != Idle` (flipped by
	// `OfferManager::create_offer`/`complete_task`/`reject_task`/
	// `expire_offers`); this set is for drivers assigned earlier in the
	// *same* tick, since the snapshot itself doesn't change mid-tick.
	let drivers_with_active_tasks: HashSet<String> = HashSet::new();
	let routes = dispatch::batch::plan_routes(
		&snapshot.drivers,
		&pending,
		&drivers_with_active_tasks,
		snapshot.params.cluster_radius_m,
		snapshot.params.radius_meters,
		router,
	)
	.await;

	for route in routes {
		let Some(first) = route.ordered_jobs.first() else { continue };
		let tasks = task_repo.by_order(&first.order_id).await.map_err(storage_err)?;
		let Some(task) = tasks.into_iter().find(|t| t.status == TaskStatus::Unassigned) else {
			continue;
		};

		offers
			.create_offer(
				&task.id,
				&route.driver_id,
				json!({"source": "batch_tick", "cluster_size": route.ordered_jobs.len()}),
				snapshot.params.offer_ttl_s * 1000,
			)
			.await?;
		result.offers_created += 1;
	}

	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;
	use adapters::implementations::router_fake::StraightLineRouter;
	use core_types::{
		DeliveryTask, Driver, DriverMetrics, DriverOnboardingStatus, DriverStatus, Order, OrderStatus,
		PaymentStatus, Route,
	};
	use std::collections::HashSet;
	use storage::implementations::memory::MemoryStorage;
	use storage::repos::{DriverRepo, EventLog, IdempotencyStore, OfferLogRepo, OrderRepo};
	use storage::StorageService;

	fn driver(id: &str, lat: f64, lng: f64) -> Driver {
		Driver {
			id: id.to_string(),
			status: DriverStatus::Idle,
			onboarding_status: DriverOnboardingStatus::Active,
			lat,
			lng,
			zone_id: None,
			insurance_verified: true,
			registration_verified: true,
			vehicle_verified: true,
			background_clear: true,
			metrics: DriverMetrics::default(),
		}
	}

	fn job(order_id: &str, lat: f64, lng: f64) -> dispatch::Job {
		dispatch::Job {
			order_id: order_id.to_string(),
			job_id: format!("job_{order_id}"),
			pickup_lat: lat,
			pickup_lng: lng,
			drop_lat: lat,
			drop_lng: lng,
			zone_id: None,
			ready_at_ms: 0,
			deadline_ms: 1_800_000_000,
			payout_cents_est: 1000,
			approx_eta_drop_s: 600,
		}
	}

	#[tokio::test]
	async fn fast_tick_offers_the_nearest_idle_driver() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let task_repo = Arc::new(TaskRepo::new(storage.clone()));
		let order_repo = Arc::new(OrderRepo::new(storage.clone()));
		let offer_logs = Arc::new(OfferLogRepo::new(storage.clone()));
		let events = Arc::new(EventLog::new(storage.clone()));
		let idempotency = Arc::new(IdempotencyStore::new(storage.clone()));
		let driver_repo = Arc::new(DriverRepo::new(storage.clone()));
		let offers = Arc::new(OfferManager::new(
			task_repo.clone(),
			order_repo.clone(),
			offer_logs,
			events,
			idempotency,
			driver_repo,
		));

		let order = Order {
			id: "ord_1".to_string(),
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
			items: vec![],
			created_at: 0,
		};
		order_repo.insert(&order).await.unwrap();

		let task = DeliveryTask {
			id: "task_1".to_string(),
			order_id: "ord_1".to_string(),
			status: TaskStatus::Unassigned,
			driver_id: None,
			offered_to_driver_id: None,
			offer_expires_at: None,
			route: Route::delivery(),
			created_at: 0,
		};
		task_repo.insert(&task).await.unwrap();

		let snapshot = DispatchSnapshot {
			ts_ms: 0,
			drivers: vec![driver("d1", 30.0, -97.0)],
			jobs: vec![job("ord_1", 30.0, -97.0)],
			active_order_ids: HashSet::new(),
			params: dispatch::DispatchParams::default(),
		};

		let router = StraightLineRouter;
		let result = run_fast_tick(&snapshot, &router, &task_repo, &offers).await.unwrap();

		assert_eq!(result.offers_created, 1);
		let task = task_repo.get("task_1").await.unwrap();
		assert_eq!(task.status, TaskStatus::Offered);
		assert_eq!(task.offered_to_driver_id.as_deref(), Some("d1"));
	}
}
