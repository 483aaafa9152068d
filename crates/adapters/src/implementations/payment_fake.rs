//! Deterministic fake payment processor.
//!
//! Grounded on `original_source/packages/payments/processor_fake.py`:
//! every authorization succeeds and settles immediately, useful for
//! integration tests that exercise the OLE without a live processor.

use async_trait::async_trait;

use crate::payment::{PaymentAdapter, PaymentError, PaymentResult};

pub struct FakePaymentAdapter;

#[async_trait]
impl PaymentAdapter for FakePaymentAdapter {
	async fn authorize(&self, amount_minor: i64) -> Result<PaymentResult, PaymentError> {
		Ok(PaymentResult {
			processor: "fake".to_string(),
			payment_intent_id: format!("pi_{}", uuid::Uuid::new_v4().simple()),
			amount_minor,
		})
	}
}
