//! Delivery task types.

use serde::{Deserialize, Serialize};

use crate::enums::{RouteKind, TaskStatus};

/// A route a [`DeliveryTask`] carries: either an ordinary delivery or a
/// return to the originating store after a refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
	#[serde(flatten)]
	pub kind: RouteKind,
}

impl Route {
	pub fn delivery() -> Self {
		Route {
			kind: RouteKind::Delivery,
		}
	}

	pub fn return_to(to_store_id: impl Into<String>) -> Self {
		Route {
			kind: RouteKind::Return {
				to_store_id: to_store_id.into(),
			},
		}
	}
}

/// A unit of work the dispatch engine assigns to a driver.
///
/// Invariant: at most one `DeliveryTask` per order may be in an active
/// status (`Offered`, `Accepted`, `InProgress`); `offer_expires_at` is
/// `Some` iff `status == Offered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
	pub id: String,
	pub order_id: String,
	pub status: TaskStatus,
	pub driver_id: Option<String>,
	pub offered_to_driver_id: Option<String>,
	pub offer_expires_at: Option<u64>,
	pub route: Route,
	pub created_at: u64,
}
