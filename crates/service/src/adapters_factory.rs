//! Startup-time vendor selection, grounded on the teacher's per-kind
//! `ImplementationRegistry` factory pattern (`solver-storage`'s
//! `StorageRegistry`) — one `match` per vendor concern, resolved once
//! before the server starts, never per call (spec.md §9, "Dynamic
//! dispatch").

use std::sync::Arc;

use adapters::implementations::payment_fake::FakePaymentAdapter;
use adapters::implementations::router_cache::CachedRouter;
use adapters::implementations::router_fake::StraightLineRouter;
use adapters::implementations::verification_fake::FakeVerificationAdapter;
use adapters::{PaymentAdapter, RouterAdapter, VerificationAdapter};

use crate::config::AdaptersConfig;

pub fn build_verification_adapter(config: &AdaptersConfig) -> Arc<dyn VerificationAdapter> {
	match config.idv_vendor.as_str() {
		"fake" => Arc::new(FakeVerificationAdapter),
		other => {
			tracing::warn!(vendor = other, "unknown IDV_VENDOR, falling back to fake");
			Arc::new(FakeVerificationAdapter)
		}
	}
}

pub fn build_payment_adapter(config: &AdaptersConfig) -> Arc<dyn PaymentAdapter> {
	match config.payment_processor.as_str() {
		"fake" => Arc::new(FakePaymentAdapter),
		other => {
			tracing::warn!(processor = other, "unknown PAYMENT_PROCESSOR, falling back to fake");
			Arc::new(FakePaymentAdapter)
		}
	}
}

pub fn build_router_adapter(config: &AdaptersConfig) -> Arc<dyn RouterAdapter> {
	match config.router_mode.as_str() {
		"cached" => Arc::new(CachedRouter::new(StraightLineRouter)),
		"straight_line" => Arc::new(StraightLineRouter),
		other => {
			tracing::warn!(mode = other, "unknown ROUTER_MODE, falling back to straight_line");
			Arc::new(StraightLineRouter)
		}
	}
}
