//! Haversine-based travel-time approximation.
//!
//! Grounded on `original_source/packages/router/router.py`'s `HAVERSINE`
//! mode: assumes a 35 mph average with a 1.25 road factor, clamped to
//! [5s, 1h]. The default router until a real road-graph vendor is wired
//! up behind `ROUTER_MODE`.

use async_trait::async_trait;
use geo::haversine_m;

use crate::router::{LatLng, RouterAdapter, RouterError};

const AVG_MPH: f64 = 35.0;
const ROAD_FACTOR: f64 = 1.25;
const MIN_SECONDS: u32 = 5;
const MAX_SECONDS: u32 = 60 * 60;

#[derive(Clone, Copy, Default)]
pub struct StraightLineRouter;

#[async_trait]
impl RouterAdapter for StraightLineRouter {
	async fn route_time_latlng(&self, a: LatLng, b: LatLng) -> Result<u32, RouterError> {
		let dist_m = haversine_m(a.lat, a.lng, b.lat, b.lng);
		let mps = (AVG_MPH * 1609.34) / 3600.0;
		let seconds = (dist_m / mps) * ROAD_FACTOR;
		Ok((seconds as u32).clamp(MIN_SECONDS, MAX_SECONDS))
	}
}
