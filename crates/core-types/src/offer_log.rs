//! Offer log (analytics) types.

use serde::{Deserialize, Serialize};

/// Terminal outcome of an offer, recorded for later acceptance-model
/// training. Kept stable in shape per
/// `original_source/packages/dispatch/offers.py::_mk_offer_features`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferOutcome {
	Accepted,
	Rejected,
	Timeout,
	Canceled,
}

/// An immutable record of a single offer, independent of the task's
/// current state, kept for analytics/ML training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferLog {
	pub id: String,
	pub task_id: String,
	pub order_id: String,
	pub driver_id: String,
	/// Snapshot of the inputs used to score this offer: timestamp, region,
	/// scoring weights, and edge debug info. Not interpreted by the core,
	/// only preserved.
	pub features: serde_json::Value,
	pub outcome: Option<OfferOutcome>,
	pub outcome_ms: Option<u64>,
	pub response_latency_ms: Option<u64>,
	pub created_at: u64,
}
