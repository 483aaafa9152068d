//! OrderService: idempotent operations combining the StateMachine, the
//! EventLog, and the vendor adapters.
//!
//! Grounded on `original_source/apps/api/routers/orders.py`. One notable
//! departure: the original checks the order's precondition status *before*
//! consulting the idempotency cache, which means a replayed call only
//! succeeds while the order is still in its pre-call state — a second,
//! identical call made after the first one already transitioned the order
//! would hit the precondition check and 409 instead of replaying. That
//! breaks the idempotence testable property (spec.md §8, "calling
//! `verify_age` N times with the same key + body returns the same
//! response"). Here the precondition check is moved inside the `compute`
//! closure, so a cache hit always short-circuits straight to the stored
//! response regardless of current order state.

use std::sync::Arc;

use core_types::{
	ActorType, ApiError, Order, OrderItem, OrderStatus, PaymentStatus, ReasonCode,
	VerificationStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use storage::repos::{EventLog, IdempotencyStore, OrderRepo, TaskRepo};
use storage::StorageError;

use adapters::{PaymentAdapter, PaymentError, VerificationAdapter, VerificationError};
use core_types::{DeliveryTask, Route};

use crate::catalog::ProductCatalog;
use crate::state_machine::{transition, try_transition, InvalidStateTransition};
use crate::time::now_ms;

const ROUTE_CREATE_ORDER: &str = "POST:/orders";
const ROUTE_VERIFY_AGE: &str = "POST:/orders/{order_id}/verify_age";
const ROUTE_AUTHORIZE_PAYMENT: &str = "POST:/orders/{order_id}/payment/authorize";
const ROUTE_DOORSTEP_ID_CHECK: &str = "POST:/orders/{order_id}/doorstep_id_check/submit";
const ROUTE_DELIVER_CONFIRM: &str = "POST:/orders/{order_id}/deliver/confirm";
const ROUTE_REFUSE: &str = "POST:/orders/{order_id}/refuse";

const DEFAULT_VERIFICATION_THRESHOLD: u16 = 21;

/// Whether `authorize_payment` halts at `PENDING_MERCHANT` for a human
/// merchant decision (production) or folds merchant acceptance and
/// dispatch-task creation into the same transaction (demo). See
/// `SPEC_FULL.md`'s Open Question decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerchantAcceptancePolicy {
	AutoAcceptDemo,
	HaltAtPendingMerchant,
}

#[derive(Debug, Clone)]
pub struct OrderServiceConfig {
	pub tax_rate: f64,
	pub flat_fee_minor: i64,
	pub min_payment_minor: i64,
	pub merchant_policy: MerchantAcceptancePolicy,
}

impl Default for OrderServiceConfig {
	fn default() -> Self {
		Self {
			tax_rate: 0.0825,
			flat_fee_minor: 299,
			min_payment_minor: 2500,
			merchant_policy: MerchantAcceptancePolicy::AutoAcceptDemo,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderItemRequest {
	pub product_id: String,
	pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	pub customer_id: String,
	pub store_id: String,
	pub address: String,
	pub items: Vec<CreateOrderItemRequest>,
	pub tip_minor: i64,
	pub disclosure_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
	pub order_id: String,
	pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyAgeRequest {
	pub session_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyAgeResponse {
	pub status: VerificationStatus,
	pub order_status: Option<OrderStatus>,
	pub reason_code: Option<ReasonCode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizePaymentRequest {
	pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizePaymentResponse {
	pub payment_status: PaymentStatus,
	pub order_status: OrderStatus,
	pub task_id: Option<String>,
	pub declined_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoorstepIdCheckRequest {
	pub session_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorstepIdCheckResponse {
	pub status: VerificationStatus,
	pub reason_code: Option<ReasonCode>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GpsPoint {
	pub lat: f64,
	pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverConfirmRequest {
	pub attestation_ref: String,
	pub gps: Option<GpsPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverConfirmResponse {
	pub order_status: Option<OrderStatus>,
	pub error_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefuseRequest {
	pub reason_code: String,
	pub notes: Option<String>,
	pub gps: Option<GpsPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefuseResponse {
	pub order_status: OrderStatus,
	pub return_task_id: String,
}

fn storage_err(e: StorageError) -> ApiError {
	match e {
		StorageError::NotFound => ApiError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: "order not found".to_string(),
		},
		other => ApiError::Internal {
			message: other.to_string(),
		},
	}
}

fn state_err(e: InvalidStateTransition) -> ApiError {
	ApiError::Conflict {
		error_type: "INVALID_STATE".to_string(),
		message: e.to_string(),
	}
}

fn event_err<E: std::fmt::Display>(e: E) -> ApiError {
	ApiError::Internal {
		message: e.to_string(),
	}
}

/// Exposes the idempotent operations of spec §4.4, composing
/// `StateMachine` + `EventLog` + `IdempotencyStore` + the vendor adapters.
pub struct OrderService {
	orders: Arc<OrderRepo>,
	tasks: Arc<TaskRepo>,
	events: Arc<EventLog>,
	idempotency: Arc<IdempotencyStore>,
	verification: Arc<dyn VerificationAdapter>,
	payment: Arc<dyn PaymentAdapter>,
	catalog: Arc<dyn ProductCatalog>,
	config: OrderServiceConfig,
}

impl OrderService {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		orders: Arc<OrderRepo>,
		tasks: Arc<TaskRepo>,
		events: Arc<EventLog>,
		idempotency: Arc<IdempotencyStore>,
		verification: Arc<dyn VerificationAdapter>,
		payment: Arc<dyn PaymentAdapter>,
		catalog: Arc<dyn ProductCatalog>,
		config: OrderServiceConfig,
	) -> Self {
		Self {
			orders,
			tasks,
			events,
			idempotency,
			verification,
			payment,
			catalog,
			config,
		}
	}

	pub async fn create_order(
		&self,
		idempotency_key: &str,
		request: CreateOrderRequest,
	) -> Result<(u16, CreateOrderResponse), ApiError> {
		let orders = self.orders.clone();
		let events = self.events.clone();
		let catalog = self.catalog.clone();
		let config = self.config.clone();
		let req = request.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_CREATE_ORDER, &request, move || async move {
				let mut subtotal = 0i64;
				let mut items = Vec::with_capacity(req.items.len());
				for item in &req.items {
					let unit_price = catalog.price_minor(&item.product_id).ok_or_else(|| {
						ApiError::BadRequest {
							error_type: "PRODUCT_NOT_FOUND".to_string(),
							message: format!("product {} not found", item.product_id),
						}
					})?;
					let line_total = unit_price * item.quantity as i64;
					subtotal += line_total;
					items.push(OrderItem {
						product_id: item.product_id.clone(),
						quantity: item.quantity,
						unit_price,
						line_total,
					});
				}
				let tax = (subtotal as f64 * config.tax_rate).round() as i64;
				let fees = config.flat_fee_minor;
				let total = subtotal + tax + fees + req.tip_minor;

				let order_id = format!("ord_{}", uuid::Uuid::new_v4().simple());
				let mut order = Order {
					id: order_id.clone(),
					customer_id: req.customer_id.clone(),
					store_id: req.store_id.clone(),
					address: req.address.clone(),
					status: OrderStatus::Created,
					disclosure_version: req.disclosure_version.clone(),
					subtotal,
					tax,
					fees,
					tip: req.tip_minor,
					total,
					payment_status: PaymentStatus::Unauthorized,
					items,
					created_at: now_ms(),
				};
				orders.insert(&order).await.map_err(storage_err)?;

				events
					.append(
						&order_id,
						ActorType::Customer,
						&req.customer_id,
						"DISCLOSURE_ACKNOWLEDGED",
						json!({"disclosure_version": req.disclosure_version, "locale": "en-US"}),
					)
					.await
					.map_err(event_err)?;

				order.status = transition(order.status, OrderStatus::VerifyingAge).map_err(state_err)?;
				orders.save(&order).await.map_err(storage_err)?;
				events
					.append(
						&order_id,
						ActorType::System,
						"oms",
						"ORDER_STATUS_UPDATED",
						json!({"to": order.status}),
					)
					.await
					.map_err(event_err)?;

				Ok((
					200,
					CreateOrderResponse {
						order_id,
						status: order.status,
					},
				))
			})
			.await?;

		Ok((status, resp))
	}

	pub async fn verify_age(
		&self,
		idempotency_key: &str,
		order_id: &str,
		session_ref: &str,
	) -> Result<(u16, VerifyAgeResponse), ApiError> {
		let request = VerifyAgeRequest {
			session_ref: session_ref.to_string(),
		};
		let order_id = order_id.to_string();
		let session_ref = session_ref.to_string();
		let orders = self.orders.clone();
		let events = self.events.clone();
		let verification = self.verification.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_VERIFY_AGE, &request, move || async move {
				let mut order = orders.get(&order_id).await.map_err(storage_err)?;
				if order.status != OrderStatus::VerifyingAge {
					return Err(ApiError::Conflict {
						error_type: "INVALID_STATE".to_string(),
						message: format!("order not in VERIFYING_AGE (is {:?})", order.status),
					});
				}

				events
					.append(
						&order_id,
						ActorType::System,
						"oms",
						"AGE_VERIFY_ATTEMPTED",
						json!({"method": "DOCUMENT_SCAN", "vendor": "fake", "session_ref": session_ref}),
					)
					.await
					.map_err(event_err)?;

				let outcome = match verification
					.verify_checkout(&session_ref, DEFAULT_VERIFICATION_THRESHOLD)
					.await
				{
					Ok(outcome) => outcome,
					Err(VerificationError::Transport(_)) | Err(VerificationError::Timeout) => {
						events
							.append(
								&order_id,
								ActorType::System,
								"oms",
								"AGE_VERIFY_FAILED",
								json!({"vendor": "fake", "reason_code": ReasonCode::VendorError}),
							)
							.await
							.map_err(event_err)?;
						return Ok((
							502,
							VerifyAgeResponse {
								status: VerificationStatus::Failed,
								order_status: None,
								reason_code: Some(ReasonCode::VendorError),
							},
						));
					}
				};

				if outcome.passed {
					events
						.append(
							&order_id,
							ActorType::System,
							"oms",
							"AGE_VERIFY_PASSED",
							json!({
								"vendor": "fake",
								"proof_ref": outcome.proof_ref,
								"age_threshold": DEFAULT_VERIFICATION_THRESHOLD,
								"dob_year": outcome.dob_year,
							}),
						)
						.await
						.map_err(event_err)?;
					order.status = transition(order.status, OrderStatus::PaymentAuth).map_err(state_err)?;
					orders.save(&order).await.map_err(storage_err)?;
					Ok((
						200,
						VerifyAgeResponse {
							status: VerificationStatus::Passed,
							order_status: Some(order.status),
							reason_code: None,
						},
					))
				} else {
					events
						.append(
							&order_id,
							ActorType::System,
							"oms",
							"AGE_VERIFY_FAILED",
							json!({"vendor": "fake", "proof_ref": outcome.proof_ref, "reason_code": outcome.reason_code}),
						)
						.await
						.map_err(event_err)?;
					Ok((
						403,
						VerifyAgeResponse {
							status: VerificationStatus::Failed,
							order_status: None,
							reason_code: outcome.reason_code,
						},
					))
				}
			})
			.await?;

		Ok((status, resp))
	}

	pub async fn authorize_payment(
		&self,
		idempotency_key: &str,
		order_id: &str,
		payment_method: &str,
	) -> Result<(u16, AuthorizePaymentResponse), ApiError> {
		let request = AuthorizePaymentRequest {
			payment_method: payment_method.to_string(),
		};
		let order_id = order_id.to_string();
		let orders = self.orders.clone();
		let tasks = self.tasks.clone();
		let events = self.events.clone();
		let payment = self.payment.clone();
		let config = self.config.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_AUTHORIZE_PAYMENT, &request, move || async move {
				let mut order = orders.get(&order_id).await.map_err(storage_err)?;
				if order.status != OrderStatus::PaymentAuth {
					return Err(ApiError::Conflict {
						error_type: "INVALID_STATE".to_string(),
						message: format!("order not in PAYMENT_AUTH (is {:?})", order.status),
					});
				}

				order.total = order.total.max(config.min_payment_minor);
				let result = match payment.authorize(order.total).await {
					Ok(result) => result,
					Err(PaymentError::Declined(reason)) => {
						events
							.append(
								&order_id,
								ActorType::System,
								"payments",
								"PAYMENT_DECLINED",
								json!({"reason": reason}),
							)
							.await
							.map_err(event_err)?;
						return Ok((
							402,
							AuthorizePaymentResponse {
								payment_status: order.payment_status,
								order_status: order.status,
								task_id: None,
								declined_reason: Some(reason),
							},
						));
					}
					Err(PaymentError::Transport(reason)) => {
						events
							.append(
								&order_id,
								ActorType::System,
								"payments",
								"PAYMENT_FAILED",
								json!({"reason": reason}),
							)
							.await
							.map_err(event_err)?;
						return Ok((
							502,
							AuthorizePaymentResponse {
								payment_status: order.payment_status,
								order_status: order.status,
								task_id: None,
								declined_reason: Some(reason),
							},
						));
					}
				};

				order.payment_status = PaymentStatus::Authorized;
				orders.save(&order).await.map_err(storage_err)?;
				events
					.append(
						&order_id,
						ActorType::System,
						"payments",
						"PAYMENT_AUTHORIZED",
						json!({
							"processor": result.processor,
							"payment_intent_id": result.payment_intent_id,
							"amount_minor": result.amount_minor,
						}),
					)
					.await
					.map_err(event_err)?;

				order.status = transition(order.status, OrderStatus::PendingMerchant).map_err(state_err)?;
				orders.save(&order).await.map_err(storage_err)?;
				events
					.append(&order_id, ActorType::System, "oms", "ORDER_STATUS_UPDATED", json!({"to": order.status}))
					.await
					.map_err(event_err)?;

				let mut task_id = None;
				if config.merchant_policy == MerchantAcceptancePolicy::AutoAcceptDemo {
					order.status =
						transition(order.status, OrderStatus::MerchantAccepted).map_err(state_err)?;
					orders.save(&order).await.map_err(storage_err)?;
					events
						.append(
							&order_id,
							ActorType::Merchant,
							"auto",
							"ORDER_STATUS_UPDATED",
							json!({"to": order.status}),
						)
						.await
						.map_err(event_err)?;

					order.status = transition(order.status, OrderStatus::Dispatching).map_err(state_err)?;
					orders.save(&order).await.map_err(storage_err)?;
					events
						.append(&order_id, ActorType::System, "oms", "ORDER_STATUS_UPDATED", json!({"to": order.status}))
						.await
						.map_err(event_err)?;

					let id = format!("task_{}", uuid::Uuid::new_v4().simple());
					let task = DeliveryTask {
						id: id.clone(),
						order_id: order_id.clone(),
						status: core_types::TaskStatus::Unassigned,
						driver_id: None,
						offered_to_driver_id: None,
						offer_expires_at: None,
						route: Route::delivery(),
						created_at: now_ms(),
					};
					tasks.insert(&task).await.map_err(storage_err)?;
					events
						.append(&order_id, ActorType::System, "dispatch", "TASK_CREATED", json!({"task_id": id}))
						.await
						.map_err(event_err)?;
					task_id = Some(id);
				}

				Ok((
					200,
					AuthorizePaymentResponse {
						payment_status: order.payment_status,
						order_status: order.status,
						task_id,
						declined_reason: None,
					},
				))
			})
			.await?;

		Ok((status, resp))
	}

	pub async fn doorstep_id_check(
		&self,
		idempotency_key: &str,
		order_id: &str,
		session_ref: &str,
	) -> Result<(u16, DoorstepIdCheckResponse), ApiError> {
		let request = DoorstepIdCheckRequest {
			session_ref: session_ref.to_string(),
		};
		let order_id = order_id.to_string();
		let session_ref = session_ref.to_string();
		let orders = self.orders.clone();
		let tasks = self.tasks.clone();
		let events = self.events.clone();
		let verification = self.verification.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_DOORSTEP_ID_CHECK, &request, move || async move {
				let mut order = orders.get(&order_id).await.map_err(storage_err)?;
				if !matches!(
					order.status,
					OrderStatus::MerchantAccepted
						| OrderStatus::Dispatching
						| OrderStatus::Pickup
						| OrderStatus::EnRoute
						| OrderStatus::DoorstepVerify
				) {
					return Err(ApiError::Conflict {
						error_type: "INVALID_STATE".to_string(),
						message: format!("order not eligible for doorstep check (is {:?})", order.status),
					});
				}

				if order.status != OrderStatus::DoorstepVerify {
					// Not every demo order lifecycle simulates accept_task/start_task's
					// granular Pickup/EnRoute legs before the doorstep check; cascade
					// through whichever of them remain.
					for next in [OrderStatus::Pickup, OrderStatus::EnRoute, OrderStatus::DoorstepVerify] {
						if let Some(advanced) = try_transition(order.status, next) {
							order.status = advanced;
						}
					}
					orders.save(&order).await.map_err(storage_err)?;
					events
						.append(&order_id, ActorType::System, "oms", "ORDER_STATUS_UPDATED", json!({"to": order.status}))
						.await
						.map_err(event_err)?;
				}

				events
					.append(
						&order_id,
						ActorType::Driver,
						"drv_demo",
						"DOORSTEP_ID_CHECK_STARTED",
						json!({"driver_id": "drv_demo", "method": "DOCUMENT_SCAN"}),
					)
					.await
					.map_err(event_err)?;

				let outcome = verification
					.verify_doorstep(&session_ref, DEFAULT_VERIFICATION_THRESHOLD)
					.await
					.map_err(|e| ApiError::BadGateway {
						error_type: "VENDOR_ERROR".to_string(),
						message: e.to_string(),
					})?;

				if outcome.passed {
					events
						.append(
							&order_id,
							ActorType::Driver,
							"drv_demo",
							"DOORSTEP_ID_CHECK_PASSED",
							json!({
								"vendor": "fake",
								"proof_ref": outcome.proof_ref,
								"age_threshold": DEFAULT_VERIFICATION_THRESHOLD,
								"dob_year": outcome.dob_year,
								"id_type": outcome.id_type,
								"id_last4": outcome.id_last4,
							}),
						)
						.await
						.map_err(event_err)?;
					return Ok((
						200,
						DoorstepIdCheckResponse {
							status: VerificationStatus::Passed,
							reason_code: None,
						},
					));
				}

				events
					.append(
						&order_id,
						ActorType::Driver,
						"drv_demo",
						"DOORSTEP_ID_CHECK_FAILED",
						json!({"vendor": "fake", "proof_ref": outcome.proof_ref, "reason_code": outcome.reason_code}),
					)
					.await
					.map_err(event_err)?;

				order.status =
					transition(order.status, OrderStatus::RefusedReturning).map_err(state_err)?;
				orders.save(&order).await.map_err(storage_err)?;
				events
					.append(&order_id, ActorType::System, "oms", "ORDER_STATUS_UPDATED", json!({"to": order.status}))
					.await
					.map_err(event_err)?;
				events
					.append(
						&order_id,
						ActorType::Driver,
						"drv_demo",
						"REFUSED",
						json!({"driver_id": "drv_demo", "reason_code": outcome.reason_code, "notes": serde_json::Value::Null}),
					)
					.await
					.map_err(event_err)?;

				let return_task_id = format!("task_ret_{}", uuid::Uuid::new_v4().simple());
				let return_task = DeliveryTask {
					id: return_task_id.clone(),
					order_id: order_id.clone(),
					status: core_types::TaskStatus::Unassigned,
					driver_id: None,
					offered_to_driver_id: None,
					offer_expires_at: None,
					route: Route::return_to(order.store_id.clone()),
					created_at: now_ms(),
				};
				tasks.insert(&return_task).await.map_err(storage_err)?;
				events
					.append(
						&order_id,
						ActorType::System,
						"oms",
						"RETURN_INITIATED",
						json!({"return_task_id": return_task_id, "to_store_id": order.store_id}),
					)
					.await
					.map_err(event_err)?;

				Ok((
					403,
					DoorstepIdCheckResponse {
						status: VerificationStatus::Failed,
						reason_code: outcome.reason_code,
					},
				))
			})
			.await?;

		Ok((status, resp))
	}

	pub async fn deliver_confirm(
		&self,
		idempotency_key: &str,
		order_id: &str,
		attestation_ref: &str,
		gps: Option<GpsPoint>,
	) -> Result<(u16, DeliverConfirmResponse), ApiError> {
		let request = DeliverConfirmRequest {
			attestation_ref: attestation_ref.to_string(),
			gps,
		};
		let order_id = order_id.to_string();
		let attestation_ref = attestation_ref.to_string();
		let orders = self.orders.clone();
		let events = self.events.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_DELIVER_CONFIRM, &request, move || async move {
				let mut order = orders.get(&order_id).await.map_err(storage_err)?;
				if order.status != OrderStatus::DoorstepVerify {
					return Err(ApiError::Conflict {
						error_type: "INVALID_STATE".to_string(),
						message: format!("order not in DOORSTEP_VERIFY (is {:?})", order.status),
					});
				}

				let dossier = events.get_dossier(&order_id).await.map_err(event_err)?;
				if !dossier.iter().any(|e| e.event_type == "DOORSTEP_ID_CHECK_PASSED") {
					return Ok((
						403,
						DeliverConfirmResponse {
							order_status: None,
							error_code: Some("MISSING_DOORSTEP_PASS".to_string()),
						},
					));
				}

				events
					.append(
						&order_id,
						ActorType::Driver,
						"drv_demo",
						"DELIVERED",
						json!({"driver_id": "drv_demo", "attestation_ref": attestation_ref, "gps": gps}),
					)
					.await
					.map_err(event_err)?;

				order.status = transition(order.status, OrderStatus::Delivered).map_err(state_err)?;
				orders.save(&order).await.map_err(storage_err)?;

				Ok((
					200,
					DeliverConfirmResponse {
						order_status: Some(order.status),
						error_code: None,
					},
				))
			})
			.await?;

		Ok((status, resp))
	}

	/// Explicit refusal, allowed any time before `DELIVERED`/`CANCELED`.
	/// Per spec.md §6, this endpoint also accepts an `Idempotency-Key`.
	pub async fn refuse(
		&self,
		idempotency_key: &str,
		order_id: &str,
		reason_code: &str,
		notes: Option<String>,
		gps: Option<GpsPoint>,
	) -> Result<(u16, RefuseResponse), ApiError> {
		let request = RefuseRequest {
			reason_code: reason_code.to_string(),
			notes: notes.clone(),
			gps,
		};
		let order_id = order_id.to_string();
		let reason_code = reason_code.to_string();
		let orders = self.orders.clone();
		let tasks = self.tasks.clone();
		let events = self.events.clone();

		let (status, resp, _replayed) = self
			.idempotency
			.get_or_set(idempotency_key, ROUTE_REFUSE, &request, move || async move {
				let mut order = orders.get(&order_id).await.map_err(storage_err)?;
				if matches!(order.status, OrderStatus::Delivered | OrderStatus::Canceled) {
					return Err(ApiError::Conflict {
						error_type: "INVALID_STATE".to_string(),
						message: format!("cannot refuse order in status {:?}", order.status),
					});
				}

				if order.status != OrderStatus::RefusedReturning {
					order.status =
						transition(order.status, OrderStatus::RefusedReturning).map_err(state_err)?;
					orders.save(&order).await.map_err(storage_err)?;
					events
						.append(&order_id, ActorType::System, "oms", "ORDER_STATUS_UPDATED", json!({"to": order.status}))
						.await
						.map_err(event_err)?;
				}

				events
					.append(
						&order_id,
						ActorType::Driver,
						"drv_demo",
						"REFUSED",
						json!({"driver_id": "drv_demo", "reason_code": reason_code, "notes": notes, "gps": gps}),
					)
					.await
					.map_err(event_err)?;

				let return_task_id = format!("task_ret_{}", uuid::Uuid::new_v4().simple());
				let return_task = DeliveryTask {
					id: return_task_id.clone(),
					order_id: order_id.clone(),
					status: core_types::TaskStatus::Unassigned,
					driver_id: None,
					offered_to_driver_id: None,
					offer_expires_at: None,
					route: Route::return_to(order.store_id.clone()),
					created_at: now_ms(),
				};
				tasks.insert(&return_task).await.map_err(storage_err)?;
				events
					.append(
						&order_id,
						ActorType::System,
						"oms",
						"RETURN_INITIATED",
						json!({"return_task_id": return_task_id, "to_store_id": order.store_id}),
					)
					.await
					.map_err(event_err)?;

				Ok((
					200,
					RefuseResponse {
						order_status: order.status,
						return_task_id,
					},
				))
			})
			.await?;

		Ok((status, resp))
	}

	/// Returns the ordered event chain for `order_id` (the dossier).
	pub async fn dossier(&self, order_id: &str) -> Result<Vec<core_types::OrderEvent>, ApiError> {
		self.events.get_dossier(order_id).await.map_err(event_err)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use adapters::implementations::payment_fake::FakePaymentAdapter;
	use adapters::implementations::verification_fake::FakeVerificationAdapter;
	use storage::implementations::memory::MemoryStorage;
	use storage::StorageService;

	fn new_service() -> OrderService {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let orders = Arc::new(OrderRepo::new(storage.clone()));
		let tasks = Arc::new(TaskRepo::new(storage.clone()));
		let events = Arc::new(EventLog::new(storage.clone()));
		let idempotency = Arc::new(IdempotencyStore::new(storage.clone()));
		let catalog = Arc::new(crate::catalog::StaticCatalog::default());
		catalog.insert("sku_beer_6pk", 1299);
		OrderService::new(
			orders,
			tasks,
			events,
			idempotency,
			Arc::new(FakeVerificationAdapter),
			Arc::new(FakePaymentAdapter),
			catalog,
			OrderServiceConfig::default(),
		)
	}

	fn make_request() -> CreateOrderRequest {
		CreateOrderRequest {
			customer_id: "cust_1".to_string(),
			store_id: "store_1".to_string(),
			address: "100 Main St".to_string(),
			items: vec![CreateOrderItemRequest {
				product_id: "sku_beer_6pk".to_string(),
				quantity: 1,
			}],
			tip_minor: 0,
			disclosure_version: "tx-v1.0".to_string(),
		}
	}

	#[tokio::test]
	async fn happy_path_reaches_delivered() {
		let service = new_service();
		let (status, created) = service.create_order("k1", make_request()).await.unwrap();
		assert_eq!(status, 200);
		assert_eq!(created.status, OrderStatus::VerifyingAge);

		let (status, verified) = service.verify_age("k2", &created.order_id, "tok_pass").await.unwrap();
		assert_eq!(status, 200);
		assert_eq!(verified.order_status, Some(OrderStatus::PaymentAuth));

		let (status, authorized) = service
			.authorize_payment("k3", &created.order_id, "pm_x")
			.await
			.unwrap();
		assert_eq!(status, 200);
		assert_eq!(authorized.order_status, OrderStatus::Dispatching);
		assert!(authorized.task_id.is_some());

		let (status, doorstep) = service
			.doorstep_id_check("k4", &created.order_id, "tok_pass")
			.await
			.unwrap();
		assert_eq!(status, 200);
		assert_eq!(doorstep.status, VerificationStatus::Passed);

		let (status, delivered) = service
			.deliver_confirm("k5", &created.order_id, "att_1", Some(GpsPoint { lat: 1.0, lng: 2.0 }))
			.await
			.unwrap();
		assert_eq!(status, 200);
		assert_eq!(delivered.order_status, Some(OrderStatus::Delivered));
	}

	#[tokio::test]
	async fn underage_checkout_fails_and_allows_retry_with_new_key() {
		let service = new_service();
		let (_, created) = service.create_order("k1", make_request()).await.unwrap();

		let (status, resp) = service
			.verify_age("k2", &created.order_id, "tok_underage")
			.await
			.unwrap();
		assert_eq!(status, 403);
		assert_eq!(resp.reason_code, Some(ReasonCode::Underage));

		let dossier = service.dossier(&created.order_id).await.unwrap();
		assert!(dossier.iter().any(|e| e.event_type == "AGE_VERIFY_ATTEMPTED"));
		assert!(dossier.iter().any(|e| e.event_type == "AGE_VERIFY_FAILED"));

		let (status, resp) = service.verify_age("k3-new", &created.order_id, "tok_pass").await.unwrap();
		assert_eq!(status, 200);
		assert_eq!(resp.order_status, Some(OrderStatus::PaymentAuth));
	}

	#[tokio::test]
	async fn doorstep_no_id_refuses_and_creates_return_task() {
		let service = new_service();
		let (_, created) = service.create_order("k1", make_request()).await.unwrap();
		service.verify_age("k2", &created.order_id, "tok_pass").await.unwrap();
		service
			.authorize_payment("k3", &created.order_id, "pm_x")
			.await
			.unwrap();

		let (status, resp) = service
			.doorstep_id_check("k4", &created.order_id, "tok_noid")
			.await
			.unwrap();
		assert_eq!(status, 403);
		assert_eq!(resp.reason_code, Some(ReasonCode::NoId));

		let tasks = self_tasks(&service, &created.order_id).await;
		assert!(tasks.iter().any(|t| matches!(t.route.kind, core_types::RouteKind::Return { .. })));

		let dossier = service.dossier(&created.order_id).await.unwrap();
		assert!(dossier.iter().any(|e| e.event_type == "DOORSTEP_ID_CHECK_FAILED"));
		assert!(dossier.iter().any(|e| e.event_type == "REFUSED"));
		assert!(dossier.iter().any(|e| e.event_type == "RETURN_INITIATED"));
	}

	async fn self_tasks(service: &OrderService, order_id: &str) -> Vec<DeliveryTask> {
		service.tasks.by_order(order_id).await.unwrap()
	}

	#[tokio::test]
	async fn replaying_verify_age_with_same_key_and_body_is_identical() {
		let service = new_service();
		let (_, created) = service.create_order("k1", make_request()).await.unwrap();

		let (s1, r1) = service.verify_age("same-key", &created.order_id, "tok_pass").await.unwrap();
		let (s2, r2) = service.verify_age("same-key", &created.order_id, "tok_pass").await.unwrap();
		assert_eq!(s1, s2);
		assert_eq!(r1.order_status, r2.order_status);
	}

	#[tokio::test]
	async fn replaying_verify_age_with_changed_body_conflicts() {
		let service = new_service();
		let (_, created) = service.create_order("k1", make_request()).await.unwrap();

		service.verify_age("same-key", &created.order_id, "tok_pass").await.unwrap();
		let err = service
			.verify_age("same-key", &created.order_id, "tok_underage")
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 409);
	}
}
