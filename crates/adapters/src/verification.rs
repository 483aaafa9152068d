//! `VerificationAdapter` contract: checkout and doorstep age/ID verification.

use async_trait::async_trait;
use core_types::ReasonCode;
use thiserror::Error;

/// Result of a verification call, matching
/// `original_source/packages/verification/types.py::VerificationResult`.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
	pub passed: bool,
	pub proof_ref: String,
	pub dob_year: Option<u16>,
	pub id_type: Option<String>,
	pub id_last4: Option<String>,
	pub reason_code: Option<ReasonCode>,
}

/// Transport-level failure talking to the identity vendor (502, not a
/// business failure — those are expressed as `VerificationOutcome::passed
/// == false` instead).
#[derive(Debug, Error)]
pub enum VerificationError {
	#[error("vendor unreachable: {0}")]
	Transport(String),
	#[error("verification deadline exceeded")]
	Timeout,
}

/// Thin contract over a third-party identity-verification vendor.
#[async_trait]
pub trait VerificationAdapter: Send + Sync {
	/// Checkout-time age verification.
	async fn verify_checkout(
		&self,
		session_ref: &str,
		threshold: u16,
	) -> Result<VerificationOutcome, VerificationError>;

	/// Doorstep identity verification at time of delivery.
	async fn verify_doorstep(
		&self,
		session_ref: &str,
		threshold: u16,
	) -> Result<VerificationOutcome, VerificationError>;
}
