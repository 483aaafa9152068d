//! HTTP server exposing the REST surface of spec §6.
//!
//! Grounded on `solver-service/src/server.rs`'s `AppState`/`Router`/
//! `.nest("/api", ...)`/`CorsLayer::permissive()` shape; the mutating
//! routes additionally require an `Idempotency-Key` header per spec §6.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use core_types::ApiError;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use engine::{CreateOrderRequest as EngineCreateOrderRequest, DeliverConfirmRequest, GpsPoint};

use crate::app_state::AppState;
use crate::config::ApiConfig;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn require_idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
	headers
		.get(IDEMPOTENCY_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(|s| s.to_string())
		.ok_or_else(|| ApiError::BadRequest {
			error_type: "IDEMPOTENCY_KEY_REQUIRED".to_string(),
			message: "Idempotency-Key header is required".to_string(),
		})
}

pub fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/orders", post(create_order))
		.route("/orders/{id}/verify_age", post(verify_age))
		.route("/orders/{id}/payment/authorize", post(authorize_payment))
		.route("/orders/{id}/doorstep_id_check/submit", post(doorstep_id_check))
		.route("/orders/{id}/deliver/confirm", post(deliver_confirm))
		.route("/orders/{id}/refuse", post(refuse))
		.route("/orders/{id}/dossier", get(dossier))
		.route("/tasks/{id}/offer", post(offer_task))
		.route("/tasks/{id}/accept", post(accept_task))
		.route("/tasks/{id}/reject", post(reject_task))
		.route("/tasks/{id}/start", post(start_task))
		.route("/tasks/{id}/complete", post(complete_task))
		.route("/internal/dispatch/tick", post(dispatch_tick))
		.route("/internal/dispatch/expire_offers", post(expire_offers))
		.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
		.with_state(state)
}

pub async fn serve(api_config: ApiConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(state);
	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = tokio::net::TcpListener::bind(&bind_address).await?;
	tracing::info!(address = %bind_address, "core API server starting");
	axum::serve(listener, app).await?;
	Ok(())
}

fn ok(status: u16, body: impl serde::Serialize) -> axum::response::Response {
	let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
	(status, Json(serde_json::to_value(body).unwrap_or_default())).into_response()
}

async fn create_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<EngineCreateOrderRequest>,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state.order_service.create_order(&key, request).await?;
	Ok(ok(status, resp))
}

#[derive(Debug, Deserialize)]
struct VerifyAgeBody {
	session_ref: String,
}

async fn verify_age(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(body): Json<VerifyAgeBody>,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state.order_service.verify_age(&key, &id, &body.session_ref).await?;
	Ok(ok(status, resp))
}

#[derive(Debug, Deserialize)]
struct AuthorizePaymentBody {
	payment_method: String,
}

async fn authorize_payment(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(body): Json<AuthorizePaymentBody>,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state.order_service.authorize_payment(&key, &id, &body.payment_method).await?;
	Ok(ok(status, resp))
}

#[derive(Debug, Deserialize)]
struct DoorstepIdCheckBody {
	session_ref: String,
}

async fn doorstep_id_check(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(body): Json<DoorstepIdCheckBody>,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state.order_service.doorstep_id_check(&key, &id, &body.session_ref).await?;
	Ok(ok(status, resp))
}

async fn deliver_confirm(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(body): Json<DeliverConfirmRequest>,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state
		.order_service
		.deliver_confirm(&key, &id, &body.attestation_ref, body.gps)
		.await?;
	Ok(ok(status, resp))
}

#[derive(Debug, Deserialize)]
struct RefuseBody {
	reason_code: String,
	notes: Option<String>,
	gps: Option<GpsPoint>,
}

async fn refuse(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(body): Json<RefuseBody>,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state
		.order_service
		.refuse(&key, &id, &body.reason_code, body.notes, body.gps)
		.await?;
	Ok(ok(status, resp))
}

async fn dossier(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Vec<core_types::OrderEvent>>, ApiError> {
	Ok(Json(state.order_service.dossier(&id).await?))
}

#[derive(Debug, Deserialize)]
struct DriverIdQuery {
	driver_id: String,
}

async fn offer_task(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(q): Query<DriverIdQuery>,
) -> Result<axum::response::Response, ApiError> {
	let task = state
		.offer_manager
		.create_offer(&id, &q.driver_id, serde_json::json!({"source": "manual"}), engine::DEFAULT_OFFER_TTL_MS)
		.await?;
	Ok(ok(200, task))
}

async fn accept_task(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(q): Query<DriverIdQuery>,
	headers: HeaderMap,
) -> Result<axum::response::Response, ApiError> {
	let key = require_idempotency_key(&headers)?;
	let (status, resp) = state.offer_manager.accept_task(&key, &id, &q.driver_id).await?;
	Ok(ok(status, resp))
}

async fn reject_task(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(q): Query<DriverIdQuery>,
) -> Result<axum::response::Response, ApiError> {
	let task = state.offer_manager.reject_task(&id, &q.driver_id).await?;
	Ok(ok(200, task))
}

async fn start_task(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(q): Query<DriverIdQuery>,
) -> Result<axum::response::Response, ApiError> {
	let task = state.offer_manager.start_task(&id, &q.driver_id).await?;
	Ok(ok(200, task))
}

async fn complete_task(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(q): Query<DriverIdQuery>,
) -> Result<axum::response::Response, ApiError> {
	let task = state.offer_manager.complete_task(&id, &q.driver_id).await?;
	Ok(ok(200, task))
}

fn now_ms() -> u64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn storage_err(e: storage::StorageError) -> ApiError {
	ApiError::Internal { message: e.to_string() }
}

/// Runs one fast-tick iteration synchronously, for operational triggering
/// outside the scheduled cadence.
async fn dispatch_tick(State(state): State<AppState>) -> Result<axum::response::Response, ApiError> {
	let snapshot = state.snapshot_builder.build(now_ms()).await.map_err(storage_err)?;
	let result =
		scheduler::ticks::run_fast_tick(&snapshot, state.router.as_ref(), &state.task_repo, &state.offer_manager)
			.await?;
	Ok(ok(200, result))
}

async fn expire_offers(State(state): State<AppState>) -> Result<axum::response::Response, ApiError> {
	let result = state.offer_manager.expire_offers(200).await?;
	Ok(ok(200, result))
}
