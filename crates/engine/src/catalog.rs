//! Product catalog lookup used to price order items at checkout.
//!
//! Grounded on `original_source/apps/api/routers/orders.py::create_order`,
//! which resolves each line item against a `Product` table before pricing
//! the order. Kept as a narrow trait so a real catalog service can be
//! dropped in without touching `OrderService`.

use std::collections::HashMap;
use std::sync::RwLock;

/// Resolves a product id to its unit price in minor units.
pub trait ProductCatalog: Send + Sync {
	fn price_minor(&self, product_id: &str) -> Option<i64>;
}

/// An in-memory catalog, suitable for demos and tests.
#[derive(Default)]
pub struct StaticCatalog {
	prices: RwLock<HashMap<String, i64>>,
}

impl StaticCatalog {
	pub fn new(prices: HashMap<String, i64>) -> Self {
		Self {
			prices: RwLock::new(prices),
		}
	}

	pub fn insert(&self, product_id: impl Into<String>, price_minor: i64) {
		self.prices.write().unwrap().insert(product_id.into(), price_minor);
	}
}

impl ProductCatalog for StaticCatalog {
	fn price_minor(&self, product_id: &str) -> Option<i64> {
		self.prices.read().unwrap().get(product_id).copied()
	}
}
