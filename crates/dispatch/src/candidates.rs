//! Candidate edge generation: idle drivers near each pending job's pickup.
//!
//! Grounded on `original_source/packages/dispatch/candidates.py`. Uses a
//! fixed straight-line speed distinct from `adapters::router_fake`'s
//! `StraightLineRouter` constants — this is a coarse pre-filter, not the
//! ETA that ends up on an offer.

use core_types::{Driver, DriverStatus};
use geo::{haversine_m, DriverIndex};

use crate::types::{DispatchSnapshot, Edge, Job};

/// Straight-line speed used only to rank/filter candidates before the
/// router refines them, matching `candidates.py`'s `ASSUMED_SPEED_MPS`.
const ASSUMED_SPEED_MPS: f64 = 20.0;
const ROAD_FACTOR: f64 = 1.35;

fn approx_eta_s(distance_m: f64) -> u32 {
	((distance_m * ROAD_FACTOR) / ASSUMED_SPEED_MPS).round() as u32
}

fn driver_eligible(driver: &Driver) -> bool {
	driver.status == DriverStatus::Idle
		&& driver.is_onboarded()
		&& driver.insurance_verified
		&& driver.registration_verified
}

/// Builds up to `params.k_candidates_per_job` candidate edges per pending
/// job, drawn from drivers within `hard_pickup_eta_s_max` of the job's
/// pickup point. `index`, when given, bounds the search to nearby grid
/// rings instead of scanning every driver.
pub fn generate_candidates(snapshot: &DispatchSnapshot, index: Option<&DriverIndex>) -> Vec<Edge> {
	let mut edges = Vec::new();

	for job in snapshot.pending_jobs() {
		let nearby = gather_nearby_drivers(snapshot, job, index);
		let mut scored: Vec<(f64, &Driver)> = nearby
			.iter()
			.filter(|d| driver_eligible(d))
			.map(|d| {
				let dist = haversine_m(d.lat, d.lng, job.pickup_lat, job.pickup_lng);
				(dist, d)
			})
			.filter(|(dist, _)| *dist <= snapshot.params.radius_meters)
			.collect();

		scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
		scored.truncate(snapshot.params.k_candidates_per_job);

		for (dist, driver) in scored {
			let eta_pu_s = approx_eta_s(dist);
			if eta_pu_s > snapshot.params.hard_pickup_eta_s_max {
				continue;
			}
			edges.push(Edge {
				driver_id: driver.id.clone(),
				job_id: job.job_id.clone(),
				eta_pu_s,
				eta_drop_s: job.approx_eta_drop_s,
				approx: true,
				cost: None,
			});
		}
	}

	edges
}

fn gather_nearby_drivers(snapshot: &DispatchSnapshot, job: &Job, index: Option<&DriverIndex>) -> Vec<Driver> {
	match index {
		Some(idx) => idx.expand_until(job.pickup_lat, job.pickup_lng, snapshot.params.k_candidates_per_job, 6),
		None => snapshot.drivers.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use core_types::{DriverMetrics, DriverOnboardingStatus};
	use std::collections::HashSet;

	fn driver(id: &str, lat: f64, lng: f64, status: DriverStatus) -> Driver {
		Driver {
			id: id.to_string(),
			status,
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
	fn excludes_busy_and_far_drivers() {
		let snapshot = DispatchSnapshot {
			ts_ms: 0,
			drivers: vec![
				driver("idle_near", 30.0, -97.0, DriverStatus::Idle),
				driver("busy_near", 30.0001, -97.0, DriverStatus::OnTask),
				driver("idle_far", 45.0, -97.0, DriverStatus::Idle),
			],
			jobs: vec![job("ord_1", 30.0, -97.0)],
			active_order_ids: HashSet::new(),
			params: crate::types::DispatchParams::default(),
		};

		let edges = generate_candidates(&snapshot, None);
		assert_eq!(edges.len(), 1);
		assert_eq!(edges[0].driver_id, "idle_near");
	}

	#[test]
	fn skips_jobs_with_active_tasks() {
		let mut active = HashSet::new();
		active.insert("ord_1".to_string());
		let snapshot = DispatchSnapshot {
			ts_ms: 0,
			drivers: vec![driver("idle", 30.0, -97.0, DriverStatus::Idle)],
			jobs: vec![job("ord_1", 30.0, -97.0)],
			active_order_ids: active,
			params: crate::types::DispatchParams::default(),
		};
		assert!(generate_candidates(&snapshot, None).is_empty());
	}
}
