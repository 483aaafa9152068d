//! Resolves the store and customer-address coordinates a dispatch snapshot
//! needs, standing in for `original_source/packages/dispatch/snapshot.py`'s
//! `Store`/`CustomerAddress` table joins — this port has no such tables
//! (an `Order.address` is a free-form string), so resolution is delegated
//! to a small trait the service wires up at startup.

use std::collections::HashMap;

use adapters::router::LatLng;
use async_trait::async_trait;

/// Looks up the coordinates for a store or a customer's delivery address.
#[async_trait]
pub trait GeoDirectory: Send + Sync {
	async fn store_location(&self, store_id: &str) -> Option<LatLng>;
	async fn address_location(&self, order_id: &str, address: &str) -> Option<LatLng>;
}

/// Fixed-table directory for demo/test deployments: stores are registered
/// up front, and delivery addresses resolve through a caller-supplied
/// per-order map (e.g. populated at checkout time from a geocoding vendor
/// call this core doesn't own).
#[derive(Default)]
pub struct StaticGeoDirectory {
	stores: HashMap<String, LatLng>,
	addresses: HashMap<String, LatLng>,
}

impl StaticGeoDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_store(mut self, store_id: impl Into<String>, loc: LatLng) -> Self {
		self.stores.insert(store_id.into(), loc);
		self
	}

	pub fn with_order_address(mut self, order_id: impl Into<String>, loc: LatLng) -> Self {
		self.addresses.insert(order_id.into(), loc);
		self
	}
}

#[async_trait]
impl GeoDirectory for StaticGeoDirectory {
	async fn store_location(&self, store_id: &str) -> Option<LatLng> {
		self.stores.get(store_id).copied()
	}

	async fn address_location(&self, order_id: &str, _address: &str) -> Option<LatLng> {
		self.addresses.get(order_id).copied()
	}
}

/// Deterministic stand-in geocoder for demo/live deployments: stores
/// resolve through a fixed table (there are few of them and they don't
/// move), while customer addresses — which arrive dynamically with each
/// order and aren't worth standing up a real geocoding vendor for in this
/// core — are hashed onto a small jitter around a configured city center.
/// Same address always resolves to the same point.
pub struct DeterministicGeoDirectory {
	stores: HashMap<String, LatLng>,
	center: LatLng,
	jitter_deg: f64,
}

impl DeterministicGeoDirectory {
	pub fn new(center: LatLng) -> Self {
		Self { stores: HashMap::new(), center, jitter_deg: 0.08 }
	}

	pub fn with_store(mut self, store_id: impl Into<String>, loc: LatLng) -> Self {
		self.stores.insert(store_id.into(), loc);
		self
	}

	fn hash_offset(seed: &str) -> (f64, f64) {
		use std::collections::hash_map::DefaultHasher;
		use std::hash::{Hash, Hasher};
		let mut hasher = DefaultHasher::new();
		seed.hash(&mut hasher);
		let h = hasher.finish();
		let a = ((h & 0xFFFF) as f64 / 0xFFFF as f64) * 2.0 - 1.0;
		let b = (((h >> 16) & 0xFFFF) as f64 / 0xFFFF as f64) * 2.0 - 1.0;
		(a, b)
	}
}

#[async_trait]
impl GeoDirectory for DeterministicGeoDirectory {
	async fn store_location(&self, store_id: &str) -> Option<LatLng> {
		self.stores.get(store_id).copied()
	}

	async fn address_location(&self, order_id: &str, address: &str) -> Option<LatLng> {
		let (da, db) = Self::hash_offset(&format!("{order_id}:{address}"));
		Some(LatLng {
			lat: self.center.lat + da * self.jitter_deg,
			lng: self.center.lng + db * self.jitter_deg,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn resolves_registered_store_and_address() {
		let dir = StaticGeoDirectory::new()
			.with_store("store_1", LatLng { lat: 30.0, lng: -97.0 })
			.with_order_address("ord_1", LatLng { lat: 30.1, lng: -97.1 });

		assert_eq!(dir.store_location("store_1").await, Some(LatLng { lat: 30.0, lng: -97.0 }));
		assert_eq!(dir.address_location("ord_1", "123 main st").await, Some(LatLng { lat: 30.1, lng: -97.1 }));
		assert_eq!(dir.store_location("unknown").await, None);
	}

	#[tokio::test]
	async fn deterministic_directory_is_stable_across_calls() {
		let dir = DeterministicGeoDirectory::new(LatLng { lat: 30.27, lng: -97.74 })
			.with_store("store_1", LatLng { lat: 30.3, lng: -97.7 });

		let first = dir.address_location("ord_1", "123 main st").await.unwrap();
		let second = dir.address_location("ord_1", "123 main st").await.unwrap();
		assert_eq!(first, second);

		let other = dir.address_location("ord_2", "456 elm st").await.unwrap();
		assert_ne!(first, other);
	}
}
