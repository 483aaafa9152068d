//! Wires storage, adapters, the order/offer services, and the dispatch
//! scheduler into one shared `AppState`, mirroring the teacher's
//! `server::AppState` (`solver_core::SolverEngine` held behind an `Arc`
//! alongside config and a shared HTTP client).

use std::collections::HashMap;
use std::sync::Arc;

use adapters::router::LatLng;
use adapters::RouterAdapter;
use engine::{OfferManager, OrderService, OrderServiceConfig, ProductCatalog, StaticCatalog};
use scheduler::{
	DeterministicGeoDirectory, DispatchScheduler, GeoDirectory, SchedulerIntervals, SnapshotBuilder, SweepLock,
};
use storage::repos::{DriverRepo, EventLog, IdempotencyStore, OfferLogRepo, OrderRepo, TaskRepo};
use storage::StorageService;

use crate::adapters_factory::{build_payment_adapter, build_router_adapter, build_verification_adapter};
use crate::config::Config;
use crate::storage_factory::build_storage_service;

/// Demo catalog seeded at startup, standing in for a real product service
/// (out of scope per spec.md §1).
fn demo_catalog() -> Arc<dyn ProductCatalog> {
	let mut prices = HashMap::new();
	prices.insert("beer_6pack".to_string(), 1199);
	prices.insert("wine_bottle".to_string(), 2499);
	prices.insert("spirits_750ml".to_string(), 3499);
	prices.insert("snacks".to_string(), 499);
	Arc::new(StaticCatalog::new(prices))
}

#[derive(Clone)]
pub struct AppState {
	pub order_service: Arc<OrderService>,
	pub offer_manager: Arc<OfferManager>,
	pub driver_repo: Arc<DriverRepo>,
	pub snapshot_builder: Arc<SnapshotBuilder>,
	pub router: Arc<dyn RouterAdapter>,
	pub task_repo: Arc<TaskRepo>,
}

pub struct Services {
	pub state: AppState,
	pub scheduler: Arc<DispatchScheduler>,
}

pub fn build_services(config: &Config) -> Services {
	let storage = build_storage_service(&config.storage);

	let orders = Arc::new(OrderRepo::new(storage.clone()));
	let tasks = Arc::new(TaskRepo::new(storage.clone()));
	let drivers = Arc::new(DriverRepo::new(storage.clone()));
	let events = Arc::new(EventLog::new(storage.clone()));
	let idempotency = Arc::new(IdempotencyStore::new(storage.clone()));
	let offer_logs = Arc::new(OfferLogRepo::new(storage.clone()));

	let verification = build_verification_adapter(&config.adapters);
	let payment = build_payment_adapter(&config.adapters);
	let router = build_router_adapter(&config.adapters);

	let order_service = Arc::new(OrderService::new(
		orders.clone(),
		tasks.clone(),
		events.clone(),
		idempotency.clone(),
		verification,
		payment,
		demo_catalog(),
		OrderServiceConfig::default(),
	));

	let offer_manager = Arc::new(OfferManager::new(
		tasks.clone(),
		orders.clone(),
		offer_logs,
		events,
		idempotency,
		drivers.clone(),
	));

	let geo: Arc<dyn GeoDirectory> =
		Arc::new(DeterministicGeoDirectory::new(LatLng { lat: 30.2672, lng: -97.7431 }));
	let snapshot_builder = Arc::new(scheduler::SnapshotBuilder::new(
		orders,
		tasks.clone(),
		drivers.clone(),
		geo,
		config.dispatch,
	));

	let fast_batch_lock: Arc<dyn SweepLock> = Arc::new(scheduler::InProcessSweepLock::new());
	let expiry_lock: Arc<dyn SweepLock> = Arc::new(scheduler::InProcessSweepLock::new());

	let dispatch_scheduler = Arc::new(DispatchScheduler::new(
		snapshot_builder.clone(),
		router.clone(),
		tasks.clone(),
		offer_manager.clone(),
		fast_batch_lock,
		expiry_lock,
		SchedulerIntervals::from(&config.scheduler),
	));

	Services {
		state: AppState {
			order_service,
			offer_manager,
			driver_repo: drivers,
			snapshot_builder,
			router,
			task_repo: tasks,
		},
		scheduler: dispatch_scheduler,
	}
}
