//! Enumerations shared across the domain model.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an [`crate::Order`].
///
/// The allowed transitions between these states are defined by the
/// `StateMachine` in the `engine` crate, not here — this type is purely
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	Created,
	VerifyingAge,
	PaymentAuth,
	PendingMerchant,
	MerchantAccepted,
	Dispatching,
	Pickup,
	EnRoute,
	DoorstepVerify,
	Delivered,
	RefusedReturning,
	Canceled,
}

/// Payment authorization status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
	#[default]
	Unauthorized,
	Authorized,
}

/// Actor type attached to an [`crate::OrderEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
	Customer,
	Driver,
	Merchant,
	System,
	Support,
}

/// Lifecycle status of a [`crate::DeliveryTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
	Unassigned,
	Offered,
	Accepted,
	InProgress,
	Completed,
	Expired,
	Failed,
}

impl TaskStatus {
	/// Active statuses: at most one task per order may hold one of these.
	pub fn is_active(&self) -> bool {
		matches!(
			self,
			TaskStatus::Offered | TaskStatus::Accepted | TaskStatus::InProgress
		)
	}
}

/// Outcome of an external verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
	Passed,
	Failed,
}

/// Reason a verification attempt failed, returned by the vendor adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
	Underage,
	NoId,
	Mismatch,
	DocInvalid,
	Expired,
	SuspectedFake,
	VendorError,
}

/// Availability status of a [`crate::Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
	Offline,
	Idle,
	OnTask,
	Paused,
}

/// Onboarding/compliance status gating whether a driver may go `Idle`.
///
/// Supplemented from `original_source/packages/core/enums.py::DriverStatus`
/// (renamed here to avoid colliding with the availability status the spec
/// names `Driver.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverOnboardingStatus {
	Applied,
	Active,
	ExpiringSoon,
	Suspended,
}

/// Kind of route a [`crate::DeliveryTask`] carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouteKind {
	Delivery,
	Return {
		#[serde(rename = "to_store_id")]
		to_store_id: String,
	},
}
