//! VRP-style batch planning over a longer horizon than the fast tick.
//!
//! Grounded on `original_source/packages/dispatch/batch_loop.py`. Clusters
//! pending jobs by proximity, picks the nearest eligible idle driver per
//! cluster, orders stops by nearest-neighbor, and returns each route's
//! first stop as the offer to commit — the caller (the `scheduler` crate)
//! owns actually creating that offer, since this crate has no storage
//! dependency. No VRP solver crate exists in the corpus, so the greedy
//! nearest-neighbor heuristic is the only ordering strategy — the original
//! treats it as the fallback path for the same reason `solver_mcf`'s
//! greedy assignment is the only one implemented here.

use std::collections::HashSet;

use adapters::router::LatLng;
use adapters::RouterAdapter;
use core_types::{Driver, DriverStatus};
use geo::haversine_m;
use tracing::warn;

use crate::types::Job;

const CLUSTER_MPH: f64 = 35.0;
const CLUSTER_ROAD_FACTOR: f64 = 1.25;

fn cluster_mps() -> f64 {
	(CLUSTER_MPH * 1609.34) / 3600.0
}

/// Greedy single-linkage clustering of jobs by pickup location: seed a
/// cluster with the first remaining job, absorb every other remaining job
/// within `radius_m` of the seed, repeat over what's left.
pub fn cluster_jobs(jobs: &[Job], radius_m: f64) -> Vec<Vec<Job>> {
	let mut remaining: Vec<Job> = jobs.to_vec();
	let mut clusters = Vec::new();

	while !remaining.is_empty() {
		let seed = remaining.remove(0);
		let mut cluster = vec![seed.clone()];
		let mut still_remaining = Vec::new();

		for job in remaining {
			let dist = haversine_m(seed.pickup_lat, seed.pickup_lng, job.pickup_lat, job.pickup_lng);
			if dist <= radius_m {
				cluster.push(job);
			} else {
				still_remaining.push(job);
			}
		}

		remaining = still_remaining;
		clusters.push(cluster);
	}

	clusters
}

/// Orders `jobs` by nearest-neighbor starting from `driver`'s position,
/// using haversine distance. Used when no router-refined time matrix is
/// available (e.g. a router call failed this tick).
pub fn nn_order_stops(driver: &Driver, jobs: &[Job]) -> Vec<Job> {
	if jobs.len() <= 1 {
		return jobs.to_vec();
	}

	let mut pool: Vec<Job> = jobs.to_vec();
	let mut ordered = Vec::with_capacity(jobs.len());
	let (mut cur_lat, mut cur_lng) = (driver.lat, driver.lng);

	while !pool.is_empty() {
		let mut best_idx = 0;
		let mut best_dist = f64::INFINITY;
		for (i, job) in pool.iter().enumerate() {
			let d = haversine_m(cur_lat, cur_lng, job.pickup_lat, job.pickup_lng);
			if d < best_dist {
				best_dist = d;
				best_idx = i;
			}
		}
		let chosen = pool.remove(best_idx);
		cur_lat = chosen.pickup_lat;
		cur_lng = chosen.pickup_lng;
		ordered.push(chosen);
	}

	ordered
}

/// Orders `jobs` by nearest-neighbor using a router-provided time matrix
/// (`matrix[0]` is the driver's row; `matrix[1 + i]` is `jobs[i]`'s row).
fn nn_order_stops_by_matrix(jobs: &[Job], matrix: &[Vec<u32>]) -> Vec<Job> {
	if jobs.len() <= 1 {
		return jobs.to_vec();
	}

	let mut pool: Vec<(usize, Job)> = jobs.iter().cloned().enumerate().collect();
	let mut ordered = Vec::with_capacity(jobs.len());
	let mut cur = 0usize;

	while !pool.is_empty() {
		let mut best_pos = 0;
		let mut best_t = u32::MAX;
		for (pos, (idx, _)) in pool.iter().enumerate() {
			let t = matrix[cur][idx + 1];
			if t < best_t {
				best_t = t;
				best_pos = pos;
			}
		}
		let (idx, job) = pool.remove(best_pos);
		cur = idx + 1;
		ordered.push(job);
	}

	ordered
}

/// Picks the nearest eligible idle driver (not already assigned this tick,
/// not holding an active offer/task) to `cluster`'s pickup centroid.
pub fn pick_best_driver<'a>(
	drivers: &'a [Driver],
	cluster: &[Job],
	assigned_driver_ids: &HashSet<String>,
	drivers_with_active_tasks: &HashSet<String>,
	radius_m: f64,
) -> Option<&'a Driver> {
	if drivers.is_empty() || cluster.is_empty() {
		return None;
	}

	let c_lat = cluster.iter().map(|j| j.pickup_lat).sum::<f64>() / cluster.len() as f64;
	let c_lng = cluster.iter().map(|j| j.pickup_lng).sum::<f64>() / cluster.len() as f64;

	drivers
		.iter()
		.filter(|d| d.status == DriverStatus::Idle && d.is_onboarded())
		.filter(|d| d.insurance_verified && d.registration_verified)
		.filter(|d| !assigned_driver_ids.contains(&d.id))
		.filter(|d| !drivers_with_active_tasks.contains(&d.id))
		.map(|d| (haversine_m(d.lat, d.lng, c_lat, c_lng), d))
		.filter(|(dist, _)| *dist <= radius_m)
		.min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
		.map(|(_, d)| d)
}

/// Haversine-estimated travel-time matrix for `[driver, job0, job1, ...]`,
/// using a fixed speed model. Fallback for when the router is unavailable
/// or its batch call fails.
fn haversine_time_matrix(driver: &Driver, jobs: &[Job]) -> Vec<Vec<u32>> {
	let mut locs = vec![(driver.lat, driver.lng)];
	locs.extend(jobs.iter().map(|j| (j.pickup_lat, j.pickup_lng)));

	let mps = cluster_mps();
	let n = locs.len();
	let mut matrix = vec![vec![0u32; n]; n];
	for i in 0..n {
		for j in 0..n {
			if i == j {
				continue;
			}
			let d = haversine_m(locs[i].0, locs[i].1, locs[j].0, locs[j].1);
			let t = ((d / mps) * CLUSTER_ROAD_FACTOR) as u32;
			matrix[i][j] = t.clamp(5, 3600);
		}
	}
	matrix
}

/// Travel-time matrix for `[driver, job0, job1, ...]`, sourced from the
/// injected router's batch call. Falls back to the haversine estimate if
/// the router call fails, so a batch-tick run degrades gracefully instead
/// of stalling on a vendor outage.
pub async fn build_time_matrix(driver: &Driver, jobs: &[Job], router: &dyn RouterAdapter) -> Vec<Vec<u32>> {
	let mut points = vec![LatLng { lat: driver.lat, lng: driver.lng }];
	points.extend(jobs.iter().map(|j| LatLng { lat: j.pickup_lat, lng: j.pickup_lng }));

	match router.batch_matrix(&points).await {
		Ok(matrix) => matrix,
		Err(err) => {
			warn!(error = %err, "router batch matrix failed, falling back to haversine estimate");
			haversine_time_matrix(driver, jobs)
		}
	}
}

/// One planned multi-stop route: a driver and its ordered job list.
#[derive(Debug, Clone)]
pub struct PlannedRoute {
	pub driver_id: String,
	pub ordered_jobs: Vec<Job>,
}

/// Plans one batch-tick route per cluster. Only the first stop of each
/// route is meant to become an offer; the rest informs ETA estimates for
/// later ticks once the caller re-snapshots. No VRP solver crate exists in
/// the corpus, so stops within a cluster are ordered by nearest-neighbor
/// over the router's real travel times rather than a true VRP solve.
pub async fn plan_routes(
	drivers: &[Driver],
	pending_jobs: &[Job],
	drivers_with_active_tasks: &HashSet<String>,
	cluster_radius_m: f64,
	driver_search_radius_m: f64,
	router: &dyn RouterAdapter,
) -> Vec<PlannedRoute> {
	let clusters = cluster_jobs(pending_jobs, cluster_radius_m);
	let mut assigned = HashSet::new();
	let mut routes = Vec::new();

	for cluster in clusters {
		let Some(driver) = pick_best_driver(drivers, &cluster, &assigned, drivers_with_active_tasks, driver_search_radius_m) else {
			continue;
		};
		let driver = driver.clone();
		let driver_id = driver.id.clone();
		let matrix = build_time_matrix(&driver, &cluster, router).await;
		let ordered_jobs = nn_order_stops_by_matrix(&cluster, &matrix);
		assigned.insert(driver_id.clone());
		routes.push(PlannedRoute { driver_id, ordered_jobs });
	}

	routes
}

#[cfg(test)]
mod tests {
	use super::*;
	use core_types::{DriverMetrics, DriverOnboardingStatus};

	fn driver(id: &str, lat: f64, lng: f64) -> Driver {
		Driver {
			id: id.to_string(),
			status: DriverStatus::Idle,
			onboarding_status: DriverOnboardingStatus::Active,
			lat,
			lng,
			zone_id: None,
			insurance_verified: true,
			registration_verified: true,
			vehicle_verified: true,
			background_clear: true,
			metrics: DriverMetrics::default(),
		}
	}

	fn job(id: &str, lat: f64, lng: f64) -> Job {
		Job {
			order_id: id.to_string(),
			job_id: format!("job_{id}"),
			pickup_lat: lat,
			pickup_lng: lng,
			drop_lat: lat,
			drop_lng: lng,
			zone_id: None,
			ready_at_ms: 0,
			deadline_ms: 1_800_000,
			payout_cents_est: 1000,
			approx_eta_drop_s: 600,
		}
	}

	#[test]
	fn clusters_nearby_jobs_together() {
		let jobs = vec![job("a", 30.0, -97.0), job("b", 30.001, -97.0), job("c", 45.0, -97.0)];
		let clusters = cluster_jobs(&jobs, 3000.0);
		assert_eq!(clusters.len(), 2);
	}

	#[test]
	fn nn_orders_by_proximity_to_driver_then_last_stop() {
		let d = driver("d1", 0.0, 0.0);
		let jobs = vec![job("far", 2.0, 0.0), job("near", 0.1, 0.0)];
		let ordered = nn_order_stops(&d, &jobs);
		assert_eq!(ordered[0].order_id, "near");
		assert_eq!(ordered[1].order_id, "far");
	}

	#[tokio::test]
	async fn plan_routes_assigns_each_driver_once() {
		use adapters::implementations::router_fake::StraightLineRouter;

		let drivers = vec![driver("d1", 30.0, -97.0), driver("d2", 45.0, -97.0)];
		let jobs = vec![job("a", 30.0, -97.0), job("b", 45.0, -97.0)];
		let router = StraightLineRouter;
		let routes = plan_routes(&drivers, &jobs, &HashSet::new(), 3000.0, 6000.0, &router).await;
		assert_eq!(routes.len(), 2);
		let driver_ids: HashSet<_> = routes.iter().map(|r| r.driver_id.clone()).collect();
		assert_eq!(driver_ids.len(), 2);
	}
}
