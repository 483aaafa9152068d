//! `PaymentAdapter` contract: payment authorization (and optional
//! capture/refund).

use async_trait::async_trait;
use thiserror::Error;

/// Result of a successful authorization.
#[derive(Debug, Clone)]
pub struct PaymentResult {
	pub processor: String,
	pub payment_intent_id: String,
	pub amount_minor: i64,
}

#[derive(Debug, Error)]
pub enum PaymentError {
	#[error("payment declined: {0}")]
	Declined(String),
	#[error("processor unreachable: {0}")]
	Transport(String),
}

/// Thin contract over a third-party payment processor.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
	async fn authorize(&self, amount_minor: i64) -> Result<PaymentResult, PaymentError>;

	/// Optional: capture a previously authorized amount. Default
	/// implementation treats authorization as already final (matches the
	/// fake processor, which settles at authorize time).
	async fn capture(&self, intent: &PaymentResult) -> Result<(), PaymentError> {
		let _ = intent;
		Ok(())
	}

	/// Optional: refund a previously captured amount.
	async fn refund(&self, intent: &PaymentResult) -> Result<(), PaymentError> {
		let _ = intent;
		Ok(())
	}
}
