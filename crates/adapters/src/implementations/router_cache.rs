//! Process-local router cache: LRU-ish + TTL, bounding external router
//! calls.
//!
//! Spec §4.7/§5: "cache by rounded-coordinate key with TTL ~30 s", default
//! capacity 50,000 entries, safe for concurrent callers. Built on
//! `dashmap` the way the teacher reaches for it for concurrent maps
//! elsewhere in the pack, rather than hand-rolling a lock-striped
//! HashMap.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::router::{LatLng, RouterAdapter, RouterError};

const COORD_PRECISION: f64 = 1e4; // ~11m grid cells

fn round_coord(v: f64) -> i64 {
	(v * COORD_PRECISION).round() as i64
}

type CacheKey = (i64, i64, i64, i64);

struct CacheEntry {
	seconds: u32,
	inserted_at: Instant,
	order: u64,
}

/// Wraps a `RouterAdapter` with a bounded, TTL'd cache keyed on
/// rounded coordinates.
pub struct CachedRouter<R: RouterAdapter> {
	inner: R,
	cache: DashMap<CacheKey, CacheEntry>,
	capacity: usize,
	ttl: Duration,
	clock: AtomicU64,
}

impl<R: RouterAdapter> CachedRouter<R> {
	pub fn new(inner: R) -> Self {
		Self::with_capacity_and_ttl(inner, 50_000, Duration::from_secs(30))
	}

	pub fn with_capacity_and_ttl(inner: R, capacity: usize, ttl: Duration) -> Self {
		Self {
			inner,
			cache: DashMap::new(),
			capacity,
			ttl,
			clock: AtomicU64::new(0),
		}
	}

	fn key(a: LatLng, b: LatLng) -> CacheKey {
		(
			round_coord(a.lat),
			round_coord(a.lng),
			round_coord(b.lat),
			round_coord(b.lng),
		)
	}

	fn evict_if_over_capacity(&self) {
		if self.cache.len() <= self.capacity {
			return;
		}
		// Approximate LRU: drop the globally-oldest-inserted entry. Exact
		// LRU would need an intrusive ordered structure; this bounds
		// memory, which is the actual requirement.
		if let Some(oldest_key) = self
			.cache
			.iter()
			.min_by_key(|e| e.order)
			.map(|e| *e.key())
		{
			self.cache.remove(&oldest_key);
		}
	}

	/// Number of entries currently cached (including not-yet-expired
	/// ones), for tests and metrics.
	pub fn len(&self) -> usize {
		self.cache.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cache.is_empty()
	}
}

#[async_trait]
impl<R: RouterAdapter + Send + Sync> RouterAdapter for CachedRouter<R> {
	async fn route_time_latlng(&self, a: LatLng, b: LatLng) -> Result<u32, RouterError> {
		let key = Self::key(a, b);
		if let Some(entry) = self.cache.get(&key) {
			if entry.inserted_at.elapsed() < self.ttl {
				return Ok(entry.seconds);
			}
		}

		let seconds = self.inner.route_time_latlng(a, b).await?;
		let order = self.clock.fetch_add(1, Ordering::SeqCst);
		self.cache.insert(
			key,
			CacheEntry {
				seconds,
				inserted_at: Instant::now(),
				order,
			},
		);
		self.evict_if_over_capacity();
		Ok(seconds)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::router_fake::StraightLineRouter;
	use std::sync::atomic::AtomicUsize;

	struct CountingRouter {
		inner: StraightLineRouter,
		calls: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl RouterAdapter for CountingRouter {
		async fn route_time_latlng(&self, a: LatLng, b: LatLng) -> Result<u32, RouterError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.inner.route_time_latlng(a, b).await
		}
	}

	#[tokio::test]
	async fn repeated_lookup_hits_cache() {
		let calls = Arc::new(AtomicUsize::new(0));
		let router = CachedRouter::new(CountingRouter {
			inner: StraightLineRouter,
			calls: calls.clone(),
		});
		let a = LatLng { lat: 30.0, lng: -97.0 };
		let b = LatLng { lat: 30.01, lng: -97.01 };

		router.route_time_latlng(a, b).await.unwrap();
		router.route_time_latlng(a, b).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn expired_entry_is_recomputed() {
		let calls = Arc::new(AtomicUsize::new(0));
		let router = CachedRouter::with_capacity_and_ttl(
			CountingRouter {
				inner: StraightLineRouter,
				calls: calls.clone(),
			},
			50_000,
			Duration::from_millis(1),
		);
		let a = LatLng { lat: 30.0, lng: -97.0 };
		let b = LatLng { lat: 30.01, lng: -97.01 };

		router.route_time_latlng(a, b).await.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		router.route_time_latlng(a, b).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}
}
