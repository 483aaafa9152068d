//! Order and order-event types.

use serde::{Deserialize, Serialize};

use crate::enums::{ActorType, OrderStatus, PaymentStatus};

/// A single line item on an order, priced at checkout time from the
/// product catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
	pub product_id: String,
	pub quantity: u32,
	/// Minor units (e.g. cents).
	pub unit_price: i64,
	/// `unit_price * quantity`, minor units.
	pub line_total: i64,
}

/// A customer order at a merchant store.
///
/// Invariant: `total == subtotal + tax + fees + tip`. Once
/// `payment_status == Authorized`, `total` must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	pub id: String,
	pub customer_id: String,
	pub store_id: String,
	pub address: String,
	pub status: OrderStatus,
	pub disclosure_version: String,
	pub subtotal: i64,
	pub tax: i64,
	pub fees: i64,
	pub tip: i64,
	pub total: i64,
	pub payment_status: PaymentStatus,
	pub items: Vec<OrderItem>,
	pub created_at: u64,
}

impl Order {
	/// Whether `total == subtotal + tax + fees + tip` holds.
	pub fn totals_balanced(&self) -> bool {
		self.total == self.subtotal + self.tax + self.fees + self.tip
	}
}

/// An immutable, hash-chained event in an order's dossier.
///
/// `hash_self` is computed over the canonical JSON of
/// `(id, order_id, actor_type, actor_id, event_type, payload, hash_prev)`;
/// `hash_prev` equals the previous event's `hash_self` for the same order,
/// or `None` for the first event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
	pub id: String,
	pub order_id: String,
	/// Monotonic insertion sequence, used to break ties when timestamps
	/// collide within the same transaction.
	pub seq: u64,
	pub ts: u64,
	pub actor_type: ActorType,
	pub actor_id: String,
	pub event_type: String,
	pub payload: serde_json::Value,
	pub hash_prev: Option<String>,
	pub hash_self: String,
}

/// The fields of an `OrderEvent` that go into its `hash_self`, in the
/// canonical shape hashed by `EventLog::append`.
#[derive(Serialize)]
pub(crate) struct EventHashInput<'a> {
	pub id: &'a str,
	pub order_id: &'a str,
	pub actor_type: ActorType,
	pub actor_id: &'a str,
	pub event_type: &'a str,
	pub payload: &'a serde_json::Value,
	pub hash_prev: &'a Option<String>,
}
