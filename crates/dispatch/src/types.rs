//! Snapshot and edge types shared by candidate generation, cost scoring,
//! the MCF solver, and the batch planner.
//!
//! Grounded on `original_source/packages/dispatch/{types.py,snapshot.py}`.
//! The original snapshot is a loosely-typed dict pulled fresh from the
//! database each tick; here it's a typed, caller-assembled value so the
//! dispatch crate stays free of any storage dependency.

use core_types::Driver;
use serde::{Deserialize, Serialize};

/// A pending order awaiting dispatch, carrying everything the scoring and
/// routing steps need. Built by the caller (the `scheduler` crate) from
/// `OrderRepo` plus store/address geocoding, which is out of this core's
/// scope — see `original_source/packages/dispatch/snapshot.py`'s `Store`/
/// `CustomerAddress` joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
	pub order_id: String,
	pub job_id: String,
	pub pickup_lat: f64,
	pub pickup_lng: f64,
	pub drop_lat: f64,
	pub drop_lng: f64,
	pub zone_id: Option<String>,
	pub ready_at_ms: u64,
	pub deadline_ms: u64,
	pub payout_cents_est: i64,
	/// Approximate drop-off leg ETA used until a job is matched, mirroring
	/// the original's fixed 600 s placeholder.
	pub approx_eta_drop_s: u32,
}

/// Weights for `costs::compute_cost`, matching
/// `original_source/packages/dispatch/costs.py`'s `W` dict defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostWeights {
	pub alpha_total_time: f64,
	pub beta_lateness: f64,
	pub gamma_deadhead: f64,
	pub rho_return_risk: f64,
	pub lambda_fairness: f64,
	pub mu_zone: f64,
}

impl Default for CostWeights {
	fn default() -> Self {
		Self {
			alpha_total_time: 1.0,
			beta_lateness: 25.0,
			gamma_deadhead: 1.0,
			rho_return_risk: 1.0,
			lambda_fairness: 0.0,
			mu_zone: 0.0,
		}
	}
}

/// Tunable parameters for a dispatch tick, matching
/// `snapshot.py`'s `params` block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatchParams {
	pub radius_meters: f64,
	pub hard_pickup_eta_s_max: u32,
	pub k_candidates_per_job: usize,
	pub top_k: usize,
	pub h3_res: u8,
	pub offer_ttl_s: u64,
	pub cluster_radius_m: f64,
	pub weights: CostWeights,
}

impl Default for DispatchParams {
	fn default() -> Self {
		Self {
			radius_meters: 6000.0,
			hard_pickup_eta_s_max: 900,
			k_candidates_per_job: 100,
			top_k: 20,
			h3_res: 8,
			offer_ttl_s: 30,
			cluster_radius_m: 3000.0,
			weights: CostWeights::default(),
		}
	}
}

/// A driver→job candidate edge, refined in place as the pipeline proceeds
/// (approx ETA → router ETA → scored cost). Mirrors
/// `original_source/packages/dispatch/types.py::Edge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
	pub driver_id: String,
	pub job_id: String,
	pub eta_pu_s: u32,
	pub eta_drop_s: u32,
	pub approx: bool,
	pub cost: Option<i64>,
}

/// A point-in-time view of idle drivers, pending jobs, and active tasks
/// used by one dispatch tick.
#[derive(Debug, Clone)]
pub struct DispatchSnapshot {
	pub ts_ms: u64,
	pub drivers: Vec<Driver>,
	pub jobs: Vec<Job>,
	/// order ids currently holding an active (`Offered`/`Accepted`/
	/// `InProgress`) task, excluded from candidate generation.
	pub active_order_ids: std::collections::HashSet<String>,
	pub params: DispatchParams,
}

impl DispatchSnapshot {
	/// Jobs with no active task, i.e. genuinely needing dispatch.
	pub fn pending_jobs(&self) -> Vec<&Job> {
		self.jobs
			.iter()
			.filter(|j| !self.active_order_ids.contains(&j.order_id))
			.collect()
	}
}
