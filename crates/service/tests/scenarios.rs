//! End-to-end integration tests driving `OrderService`/`OfferManager`
//! directly through the literal scenarios of spec §8, using the same
//! real-storage, real-fake-adapter wiring the unit tests use throughout
//! the workspace (no mocking framework).

use std::collections::HashMap;
use std::sync::Arc;

use adapters::implementations::payment_fake::FakePaymentAdapter;
use adapters::implementations::verification_fake::FakeVerificationAdapter;
use engine::{
	CreateOrderItemRequest, CreateOrderRequest, OfferManager, OrderService, OrderServiceConfig, ProductCatalog,
	StaticCatalog,
};
use storage::implementations::memory::MemoryStorage;
use storage::repos::{DriverRepo, EventLog, IdempotencyStore, OfferLogRepo, OrderRepo, TaskRepo};
use storage::StorageService;

fn catalog() -> Arc<dyn ProductCatalog> {
	let mut prices = HashMap::new();
	prices.insert("beer_6pack".to_string(), 1199);
	Arc::new(StaticCatalog::new(prices))
}

struct Harness {
	order_service: Arc<OrderService>,
	offer_manager: Arc<OfferManager>,
	events: Arc<EventLog>,
	tasks: Arc<TaskRepo>,
}

fn harness() -> Harness {
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
	let orders = Arc::new(OrderRepo::new(storage.clone()));
	let tasks = Arc::new(TaskRepo::new(storage.clone()));
	let events = Arc::new(EventLog::new(storage.clone()));
	let idempotency = Arc::new(IdempotencyStore::new(storage.clone()));
	let offer_logs = Arc::new(OfferLogRepo::new(storage.clone()));
	let drivers = Arc::new(DriverRepo::new(storage.clone()));

	let order_service = Arc::new(OrderService::new(
		orders.clone(),
		tasks.clone(),
		events.clone(),
		idempotency.clone(),
		Arc::new(FakeVerificationAdapter),
		Arc::new(FakePaymentAdapter),
		catalog(),
		OrderServiceConfig::default(),
	));
	let offer_manager = Arc::new(OfferManager::new(
		tasks.clone(),
		orders,
		offer_logs,
		events.clone(),
		idempotency,
		drivers,
	));

	Harness { order_service, offer_manager, events, tasks }
}

fn create_request() -> CreateOrderRequest {
	CreateOrderRequest {
		customer_id: "cust_1".to_string(),
		store_id: "store_1".to_string(),
		address: "100 Main St".to_string(),
		items: vec![CreateOrderItemRequest { product_id: "beer_6pack".to_string(), quantity: 1 }],
		tip_minor: 0,
		disclosure_version: "tx-v1.0".to_string(),
	}
}

#[tokio::test]
async fn happy_path_reaches_delivered() {
	let h = harness();

	let (status, created) = h.order_service.create_order("k1", create_request()).await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(created.status, core_types::OrderStatus::VerifyingAge);

	let (status, resp) = h.order_service.verify_age("k2", &created.order_id, "pass").await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(resp.order_status, Some(core_types::OrderStatus::PaymentAuth));

	let (status, resp) = h.order_service.authorize_payment("k3", &created.order_id, "pm_x").await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(resp.order_status, core_types::OrderStatus::Dispatching);
	let task_id = resp.task_id.expect("demo policy creates a task");

	let (status, resp) = h.order_service.doorstep_id_check("k4", &created.order_id, "pass").await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(resp.status, core_types::VerificationStatus::Passed);

	let (status, resp) = h.order_service.deliver_confirm("k5", &created.order_id, "att_1", None).await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(resp.order_status, Some(core_types::OrderStatus::Delivered));

	// The Unassigned task created by authorize_payment is still sitting
	// there; nothing in this scenario dispatches it.
	let task = h.tasks.get(&task_id).await.unwrap();
	assert_eq!(task.status, core_types::TaskStatus::Unassigned);
}

#[tokio::test]
async fn underage_at_checkout_then_retry_with_new_key() {
	let h = harness();
	let (_, created) = h.order_service.create_order("k1", create_request()).await.unwrap();

	let (status, resp) = h.order_service.verify_age("k2", &created.order_id, "underage").await.unwrap();
	assert_eq!(status, 403);
	assert_eq!(resp.reason_code, Some(core_types::ReasonCode::Underage));

	let dossier = h.events.get_dossier(&created.order_id).await.unwrap();
	assert!(dossier.iter().any(|e| e.event_type == "AGE_VERIFY_ATTEMPTED"));
	assert!(dossier.iter().any(|e| e.event_type == "AGE_VERIFY_FAILED"));

	let (status, resp) = h.order_service.verify_age("k2-new", &created.order_id, "pass").await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(resp.order_status, Some(core_types::OrderStatus::PaymentAuth));
}

#[tokio::test]
async fn doorstep_no_id_refuses_and_initiates_return() {
	let h = harness();
	let (_, created) = h.order_service.create_order("k1", create_request()).await.unwrap();
	h.order_service.verify_age("k2", &created.order_id, "pass").await.unwrap();
	h.order_service.authorize_payment("k3", &created.order_id, "pm_x").await.unwrap();

	let (status, resp) = h.order_service.doorstep_id_check("k4", &created.order_id, "noid").await.unwrap();
	assert_eq!(status, 403);
	assert_eq!(resp.reason_code, Some(core_types::ReasonCode::NoId));

	let dossier = h.events.get_dossier(&created.order_id).await.unwrap();
	assert!(dossier.iter().any(|e| e.event_type == "DOORSTEP_ID_CHECK_FAILED"));
	assert!(dossier.iter().any(|e| e.event_type == "REFUSED"));
	assert!(dossier.iter().any(|e| e.event_type == "RETURN_INITIATED"));

	let return_task = dossier
		.iter()
		.find(|e| e.event_type == "RETURN_INITIATED")
		.and_then(|e| e.payload.get("return_task_id").and_then(|v| v.as_str()))
		.expect("return task recorded");
	let task = h.tasks.get(return_task).await.unwrap();
	assert_eq!(task.route.kind, core_types::RouteKind::Return);
}

#[tokio::test]
async fn replayed_idempotency_key_returns_identical_response_and_conflicts_on_body_change() {
	let h = harness();
	let (_, created) = h.order_service.create_order("k1", create_request()).await.unwrap();

	let (status_a, resp_a) = h.order_service.verify_age("dup", &created.order_id, "pass").await.unwrap();
	let (status_b, resp_b) = h.order_service.verify_age("dup", &created.order_id, "pass").await.unwrap();
	assert_eq!(status_a, status_b);
	assert_eq!(resp_a.order_status, resp_b.order_status);

	let err = h.order_service.verify_age("dup", &created.order_id, "underage").await.unwrap_err();
	assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn offer_expiry_sweep_marks_task_expired() {
	let h = harness();
	let (_, created) = h.order_service.create_order("k1", create_request()).await.unwrap();
	h.order_service.verify_age("k2", &created.order_id, "pass").await.unwrap();
	let (_, resp) = h.order_service.authorize_payment("k3", &created.order_id, "pm_x").await.unwrap();
	let task_id = resp.task_id.unwrap();

	// Offer with a TTL already in the past so the sweep finds it expired
	// without needing to fast-forward a real clock.
	h.offer_manager.create_offer(&task_id, "drv_1", serde_json::json!({}), 0).await.unwrap();
	tokio::time::sleep(std::time::Duration::from_millis(5)).await;

	let result = h.offer_manager.expire_offers(10).await.unwrap();
	assert_eq!(result.expired_tasks, 1);

	let task = h.tasks.get(&task_id).await.unwrap();
	assert_eq!(task.status, core_types::TaskStatus::Expired);
}

/// An order may not reach `Delivered` on the strength of the checkout-time
/// age check alone: the dossier must also carry a doorstep verification
/// pass. Regression test for the two-gate compliance posture this core
/// exists to enforce.
#[tokio::test]
async fn delivered_order_always_carries_both_verification_events() {
	let h = harness();
	let (_, created) = h.order_service.create_order("k1", create_request()).await.unwrap();
	h.order_service.verify_age("k2", &created.order_id, "pass").await.unwrap();
	h.order_service.authorize_payment("k3", &created.order_id, "pm_x").await.unwrap();
	h.order_service.doorstep_id_check("k4", &created.order_id, "pass").await.unwrap();
	let (status, resp) = h.order_service.deliver_confirm("k5", &created.order_id, "att_1", None).await.unwrap();
	assert_eq!(status, 200);
	assert_eq!(resp.order_status, Some(core_types::OrderStatus::Delivered));

	let dossier = h.events.get_dossier(&created.order_id).await.unwrap();
	assert!(dossier.iter().any(|e| e.event_type == "AGE_VERIFY_PASSED"));
	assert!(dossier.iter().any(|e| e.event_type == "DOORSTEP_ID_CHECK_PASSED"));

	// Skipping straight to delivery without a doorstep check is rejected.
	let (_, created_2) = h.order_service.create_order("k1b", create_request()).await.unwrap();
	h.order_service.verify_age("k2b", &created_2.order_id, "pass").await.unwrap();
	h.order_service.authorize_payment("k3b", &created_2.order_id, "pm_x").await.unwrap();
	let err = h
		.order_service
		.deliver_confirm("k4b", &created_2.order_id, "att_1", None)
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), 409);
}
