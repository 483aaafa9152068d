//! Refines approximate candidate edges with real router ETAs.
//!
//! Grounded on `original_source/packages/dispatch/eta.py`: the fast-tick
//! pipeline only calls the router for the (small) candidate set survives
//! after the coarse haversine filter, never for the full driver fleet.

use adapters::router::LatLng;
use adapters::RouterAdapter;
use tracing::warn;

use crate::types::{DispatchSnapshot, Edge};

/// Replaces each edge's approximate pickup and drop-off ETAs with
/// router-provided ones (driver->pickup and pickup->drop). An edge whose
/// router call fails on either leg is dropped rather than offered on a
/// stale estimate.
pub async fn refine_edges_with_router(
	snapshot: &DispatchSnapshot,
	edges: Vec<Edge>,
	router: &dyn RouterAdapter,
) -> Vec<Edge> {
	let mut refined = Vec::with_capacity(edges.len());

	for mut edge in edges {
		let Some(driver) = snapshot.drivers.iter().find(|d| d.id == edge.driver_id) else {
			continue;
		};
		let Some(job) = snapshot.jobs.iter().find(|j| j.job_id == edge.job_id) else {
			continue;
		};

		let pickup = LatLng { lat: job.pickup_lat, lng: job.pickup_lng };
		let drop = LatLng { lat: job.drop_lat, lng: job.drop_lng };
		let driver_pos = LatLng { lat: driver.lat, lng: driver.lng };

		let eta_pu_s = match router.route_time_latlng(driver_pos, pickup).await {
			Ok(eta) => eta,
			Err(err) => {
				warn!(driver_id = %edge.driver_id, job_id = %edge.job_id, error = %err, "router eta refinement failed, dropping edge");
				continue;
			}
		};
		let eta_drop_s = match router.route_time_latlng(pickup, drop).await {
			Ok(eta) => eta,
			Err(err) => {
				warn!(driver_id = %edge.driver_id, job_id = %edge.job_id, error = %err, "router eta refinement failed, dropping edge");
				continue;
			}
		};

		edge.eta_pu_s = eta_pu_s;
		edge.eta_drop_s = eta_drop_s;
		edge.approx = false;
		refined.push(edge);
	}

	refined
}
