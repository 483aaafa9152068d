//! Deterministic fake identity-verification vendor.
//!
//! Grounded on
//! `original_source/packages/verification/vendors_fake.py`: the
//! `session_ref` string itself encodes the vendor's canned response, which
//! lets integration tests and the literal scenarios of spec §8 drive every
//! branch without a real vendor.

use async_trait::async_trait;
use core_types::ReasonCode;

use crate::verification::{VerificationAdapter, VerificationError, VerificationOutcome};

pub struct FakeVerificationAdapter;

#[async_trait]
impl VerificationAdapter for FakeVerificationAdapter {
	async fn verify_checkout(
		&self,
		session_ref: &str,
		_threshold: u16,
	) -> Result<VerificationOutcome, VerificationError> {
		let proof_ref = format!("proof_{}", uuid::Uuid::new_v4().simple());
		if session_ref.contains("pass") {
			return Ok(VerificationOutcome {
				passed: true,
				proof_ref,
				dob_year: Some(1999),
				id_type: None,
				id_last4: None,
				reason_code: None,
			});
		}
		if session_ref.contains("underage") {
			return Ok(VerificationOutcome {
				passed: false,
				proof_ref,
				dob_year: None,
				id_type: None,
				id_last4: None,
				reason_code: Some(ReasonCode::Underage),
			});
		}
		Ok(VerificationOutcome {
			passed: false,
			proof_ref,
			dob_year: None,
			id_type: None,
			id_last4: None,
			reason_code: Some(ReasonCode::VendorError),
		})
	}

	async fn verify_doorstep(
		&self,
		session_ref: &str,
		_threshold: u16,
	) -> Result<VerificationOutcome, VerificationError> {
		let proof_ref = format!("proof_{}", uuid::Uuid::new_v4().simple());
		if session_ref.contains("pass") {
			return Ok(VerificationOutcome {
				passed: true,
				proof_ref,
				dob_year: Some(1999),
				id_type: Some("DL".to_string()),
				id_last4: Some("1234".to_string()),
				reason_code: None,
			});
		}
		let reason_code = if session_ref.contains("noid") {
			ReasonCode::NoId
		} else if session_ref.contains("mismatch") {
			ReasonCode::Mismatch
		} else if session_ref.contains("underage") {
			ReasonCode::Underage
		} else if session_ref.contains("expired") {
			ReasonCode::Expired
		} else if session_ref.contains("fake") {
			ReasonCode::SuspectedFake
		} else {
			ReasonCode::VendorError
		};
		Ok(VerificationOutcome {
			passed: false,
			proof_ref,
			dob_year: None,
			id_type: None,
			id_last4: None,
			reason_code: Some(reason_code),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn pass_session_passes_checkout() {
		let adapter = FakeVerificationAdapter;
		let outcome = adapter.verify_checkout("tok_pass", 21).await.unwrap();
		assert!(outcome.passed);
	}

	#[tokio::test]
	async fn underage_session_fails_with_reason() {
		let adapter = FakeVerificationAdapter;
		let outcome = adapter.verify_checkout("tok_underage", 21).await.unwrap();
		assert!(!outcome.passed);
		assert_eq!(outcome.reason_code, Some(ReasonCode::Underage));
	}

	#[tokio::test]
	async fn noid_session_fails_doorstep_with_no_id() {
		let adapter = FakeVerificationAdapter;
		let outcome = adapter.verify_doorstep("tok_noid", 21).await.unwrap();
		assert!(!outcome.passed);
		assert_eq!(outcome.reason_code, Some(ReasonCode::NoId));
	}
}
