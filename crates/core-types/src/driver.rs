//! Driver identity, eligibility, and rolling metrics.

use serde::{Deserialize, Serialize};

use crate::enums::{DriverOnboardingStatus, DriverStatus};

/// Rolling performance metrics used by the acceptance heuristic and cost
/// scoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriverMetrics {
	pub accept_rate_7d: f64,
	pub cancel_rate_7d: f64,
	pub recent_timeouts: u32,
	pub fairness_penalty: f64,
}

impl Default for DriverMetrics {
	fn default() -> Self {
		DriverMetrics {
			accept_rate_7d: 0.6,
			cancel_rate_7d: 0.05,
			recent_timeouts: 0,
			fairness_penalty: 0.0,
		}
	}
}

/// A courier eligible to be matched to delivery tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
	pub id: String,
	pub status: DriverStatus,
	/// Supplemented from `original_source`: onboarding/compliance gate,
	/// separate from the minute-to-minute availability `status` above.
	pub onboarding_status: DriverOnboardingStatus,
	pub lat: f64,
	pub lng: f64,
	pub zone_id: Option<String>,
	pub insurance_verified: bool,
	pub registration_verified: bool,
	pub vehicle_verified: bool,
	pub background_clear: bool,
	pub metrics: DriverMetrics,
}

impl Driver {
	/// Whether this driver is eligible to receive offers at all, combining
	/// the onboarding gate with the per-task eligibility checks used by
	/// candidate generation.
	pub fn is_onboarded(&self) -> bool {
		matches!(
			self.onboarding_status,
			DriverOnboardingStatus::Active | DriverOnboardingStatus::ExpiringSoon
		)
	}
}
