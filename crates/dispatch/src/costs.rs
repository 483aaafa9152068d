//! Per-edge cost scoring.
//!
//! Grounded on `original_source/packages/dispatch/costs.py`.

use core_types::Driver;
use serde::{Deserialize, Serialize};

use crate::acceptance::p_accept;
use crate::types::{CostWeights, Job};

/// Scoring breakdown, kept alongside the cost for debugging/offer-log
/// snapshots (the original attaches this as `Edge.debug`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostBreakdown {
	pub total_time_s: u32,
	pub lateness_s: u32,
	pub p_accept: f64,
	pub risk_pen: f64,
}

/// Default id-fail risk used when no prediction is available for this
/// `(driver, job)` pair, matching `costs.py`'s inline default.
const DEFAULT_P_FAIL: f64 = 0.03;
const DEFAULT_EXPECTED_RETURN_S: u32 = 600;

/// Computes the integer cost of assigning `driver` to `job` given the
/// (possibly router-refined) pickup/drop ETAs.
pub fn compute_cost(
	weights: &CostWeights,
	now_ms: u64,
	driver: &Driver,
	job: &Job,
	eta_pu_s: u32,
	eta_drop_s: u32,
) -> (i64, CostBreakdown) {
	let arrive_pu_ms = now_ms + eta_pu_s as u64 * 1000;
	let wait_pu_s = (job.ready_at_ms.saturating_sub(arrive_pu_ms)) / 1000;

	let total_time_s = eta_pu_s + wait_pu_s as u32 + eta_drop_s;
	let finish_ms = now_ms + total_time_s as u64 * 1000;
	let lateness_s = (finish_ms.saturating_sub(job.deadline_ms)) / 1000;

	let (p_fail, exp_return_s) = (DEFAULT_P_FAIL, DEFAULT_EXPECTED_RETURN_S);
	let risk_pen = p_fail * exp_return_s as f64;

	let fairness_pen = driver.metrics.fairness_penalty;
	let zone_pen = match (&driver.zone_id, &job.zone_id) {
		(Some(d), Some(j)) if d != j => 1.0,
		_ => 0.0,
	};

	let base = weights.alpha_total_time * total_time_s as f64
		+ weights.beta_lateness * lateness_s as f64
		+ weights.gamma_deadhead * eta_pu_s as f64
		+ weights.rho_return_risk * risk_pen
		+ weights.lambda_fairness * fairness_pen
		+ weights.mu_zone * zone_pen;

	let pacc = p_accept(&driver.metrics, job.payout_cents_est, eta_pu_s, total_time_s);
	let cost = (base / pacc.max(1e-3)).round() as i64;

	(
		cost,
		CostBreakdown {
			total_time_s,
			lateness_s: lateness_s as u32,
			p_accept: pacc,
			risk_pen,
		},
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use core_types::{DriverMetrics, DriverOnboardingStatus, DriverStatus};

	fn driver(zone: Option<&str>) -> Driver {
		Driver {
			id: "d1".to_string(),
			status: DriverStatus::Idle,
			onboarding_status: DriverOnboardingStatus::Active,
			lat: 0.0,
			lng: 0.0,
			zone_id: zone.map(|z| z.to_string()),
			insurance_verified: true,
			registration_verified: true,
			vehicle_verified: true,
			background_clear: true,
			metrics: DriverMetrics::default(),
		}
	}

	fn job(zone: Option<&str>) -> Job {
		Job {
			order_id: "ord_1".to_string(),
			job_id: "job_ord_1".to_string(),
			pickup_lat: 0.0,
			pickup_lng: 0.0,
			drop_lat: 0.0,
			drop_lng: 0.0,
			zone_id: zone.map(|z| z.to_string()),
			ready_at_ms: 0,
			deadline_ms: 1_800_000,
			payout_cents_est: 1000,
			approx_eta_drop_s: 600,
		}
	}

	#[test]
	fn cost_is_non_negative() {
		let (cost, _) = compute_cost(&CostWeights::default(), 0, &driver(None), &job(None), 300, 600);
		assert!(cost >= 0);
	}

	#[test]
	fn zone_mismatch_adds_penalty_when_weighted() {
		let mut weights = CostWeights::default();
		weights.mu_zone = 100.0;
		let (matched, _) = compute_cost(&weights, 0, &driver(Some("z1")), &job(Some("z1")), 300, 600);
		let (mismatched, _) = compute_cost(&weights, 0, &driver(Some("z1")), &job(Some("z2")), 300, 600);
		assert!(mismatched > matched);
	}
}
