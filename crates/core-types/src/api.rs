//! Structured API error type and HTTP status mapping.
//!
//! Grounded on `solver_types::APIError` in the teacher repo: a small closed
//! set of error shapes, each carrying an `error_type` code matching §6/§7 of
//! the spec (`IDEMPOTENCY_KEY_REQUIRED`, `IDEMPOTENCY_CONFLICT`, etc.) plus a
//! human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON error body returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Structured API error with its HTTP status mapping baked in.
#[derive(Debug, Clone)]
pub enum ApiError {
	/// 400 — validation failure (missing idempotency key, unknown product, …).
	BadRequest { error_type: String, message: String },
	/// 403 — verification failed, wrong driver, missing doorstep pass.
	Forbidden { error_type: String, message: String },
	/// 404 — entity not found.
	NotFound { error_type: String, message: String },
	/// 409 — invalid state transition, idempotency conflict, lock contention.
	Conflict { error_type: String, message: String },
	/// 502 — vendor transport failure.
	BadGateway { error_type: String, message: String },
	/// 500 — unexpected/programming error.
	Internal { message: String },
}

impl ApiError {
	pub fn status_code(&self) -> u16 {
		match self {
			ApiError::BadRequest { .. } => 400,
			ApiError::Forbidden { .. } => 403,
			ApiError::NotFound { .. } => 404,
			ApiError::Conflict { .. } => 409,
			ApiError::BadGateway { .. } => 502,
			ApiError::Internal { .. } => 500,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			ApiError::BadRequest { error_type, message }
			| ApiError::Forbidden { error_type, message }
			| ApiError::NotFound { error_type, message }
			| ApiError::Conflict { error_type, message }
			| ApiError::BadGateway { error_type, message } => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
			ApiError::Internal { message } => ErrorResponse {
				error: "INTERNAL".to_string(),
				message: message.clone(),
				details: None,
			},
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_error_response().message)
	}
}

impl std::error::Error for ApiError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		use axum::http::StatusCode;
		use axum::Json;

		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
