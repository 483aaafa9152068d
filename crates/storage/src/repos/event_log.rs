//! EventLog: append-only, hash-chained dossier per order.
//!
//! Grounded on `original_source/packages/dossier/writer.py::emit_order_event`
//! and the teacher's `OrderStateMachine::update_order_with` pattern of
//! wrapping a storage round-trip in a typed service method. Concurrent
//! appends to the same order are serialized with a per-order
//! `tokio::sync::Mutex`, keyed in a `DashMap` the way the teacher reaches
//! for `dashmap` for concurrent maps elsewhere in the pack.

use core_types::{canonical_json, sha256_hex, ActorType, OrderEvent, StorageKey};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{QueryFilter, StorageError, StorageIndexes, StorageService};

#[derive(Debug, Error)]
pub enum EventLogError {
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Canonical input hashed into `hash_self`, matching spec §3's
/// `(id, order, actor_type, actor_id, event_type, payload, hash_prev)`.
#[derive(serde::Serialize)]
struct HashInput<'a> {
	id: &'a str,
	order: &'a str,
	actor_type: ActorType,
	actor_id: &'a str,
	event_type: &'a str,
	payload: &'a serde_json::Value,
	hash_prev: &'a Option<String>,
}

/// Append-only, hash-chained event log for every order.
pub struct EventLog {
	storage: Arc<StorageService>,
	locks: DashMap<String, Arc<Mutex<()>>>,
	seq: AtomicU64,
}

impl EventLog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			locks: DashMap::new(),
			seq: AtomicU64::new(0),
		}
	}

	fn lock_for(&self, order_id: &str) -> Arc<Mutex<()>> {
		self.locks
			.entry(order_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// Appends a new event to `order_id`'s dossier. Concurrent callers for
	/// the same order serialize on the per-order lock so that `hash_prev`
	/// is always read-then-linked atomically — two concurrent appenders
	/// observing the same `hash_prev` would be a chain-integrity bug.
	pub async fn append(
		&self,
		order_id: &str,
		actor_type: ActorType,
		actor_id: &str,
		event_type: &str,
		payload: serde_json::Value,
	) -> Result<OrderEvent, EventLogError> {
		let lock = self.lock_for(order_id);
		let _guard = lock.lock().await;

		let mut chain = self.get_dossier_unlocked(order_id).await?;
		let hash_prev = chain.pop().map(|e| e.hash_self);

		let seq = self.seq.fetch_add(1, Ordering::SeqCst);
		let id = format!("evt_{}", uuid::Uuid::new_v4().simple());
		let ts = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_millis() as u64;

		let hash_self = sha256_hex(&canonical_json(&HashInput {
			id: &id,
			order: order_id,
			actor_type,
			actor_id,
			event_type,
			payload: &payload,
			hash_prev: &hash_prev,
		}));

		let event = OrderEvent {
			id: id.clone(),
			order_id: order_id.to_string(),
			seq,
			ts,
			actor_type,
			actor_id: actor_id.to_string(),
			event_type: event_type.to_string(),
			payload,
			hash_prev,
			hash_self,
		};

		let indexes = StorageIndexes::new().with_field("order_id", order_id);
		self.storage
			.store(StorageKey::OrderEvents.as_str(), &event.id, &event, Some(indexes))
			.await?;

		Ok(event)
	}

	/// Returns the ordered event chain for `order_id` (the dossier).
	pub async fn get_dossier(&self, order_id: &str) -> Result<Vec<OrderEvent>, EventLogError> {
		self.get_dossier_unlocked(order_id).await
	}

	async fn get_dossier_unlocked(
		&self,
		order_id: &str,
	) -> Result<Vec<OrderEvent>, EventLogError> {
		let filter = QueryFilter::Equals(
			"order_id".to_string(),
			serde_json::Value::String(order_id.to_string()),
		);
		let mut events: Vec<(String, OrderEvent)> = self
			.storage
			.query(StorageKey::OrderEvents.as_str(), filter)
			.await?;
		events.sort_by(|a, b| (a.1.ts, a.1.seq).cmp(&(b.1.ts, b.1.seq)));
		Ok(events.into_iter().map(|(_, e)| e).collect())
	}
}
