//! Closed-form acceptance-probability heuristic.
//!
//! Grounded on `original_source/packages/predictions/acceptance.py`. Kept
//! as a plain function rather than a trait object since the spec frames
//! this as a fixed heuristic, not a pluggable model (ML training is an
//! explicit non-goal).

use core_types::DriverMetrics;

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
	x.max(lo).min(hi)
}

fn sigmoid(z: f64) -> f64 {
	1.0 / (1.0 + (-z).exp())
}

const B0: f64 = -0.2;
const B1: f64 = 1.2;
const B2: f64 = 0.15;
const B3: f64 = 0.02;
const B4: f64 = 0.8;
const B5: f64 = 0.6;
const B6: f64 = 1.0;

/// Probability `driver` accepts an offer with the given pickup ETA, total
/// trip time, and payout.
pub fn p_accept(metrics: &DriverMetrics, payout_cents: i64, eta_pu_s: u32, total_trip_s: u32) -> f64 {
	let ar = clamp(metrics.accept_rate_7d, 0.05, 0.95);
	let logit_ar = (ar / (1.0 - ar)).ln();

	let eta_pu_min = eta_pu_s as f64 / 60.0;
	let value_per_min = (payout_cents as f64 / (total_trip_s.max(1) as f64)) * 60.0;

	let z = B0 + B1 * logit_ar - B2 * eta_pu_min + B3 * (payout_cents as f64 / 100.0)
		+ B4 * value_per_min
		- B5 * metrics.recent_timeouts as f64
		- B6 * metrics.cancel_rate_7d;

	clamp(sigmoid(z), 0.05, 0.95)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stays_within_bounds() {
		let m = DriverMetrics {
			accept_rate_7d: 0.9,
			cancel_rate_7d: 0.0,
			recent_timeouts: 0,
			fairness_penalty: 0.0,
		};
		let p = p_accept(&m, 1200, 300, 900);
		assert!((0.05..=0.95).contains(&p));
	}

	#[test]
	fn worse_driver_history_lowers_probability() {
		let good = DriverMetrics {
			accept_rate_7d: 0.9,
			cancel_rate_7d: 0.0,
			recent_timeouts: 0,
			fairness_penalty: 0.0,
		};
		let bad = DriverMetrics {
			accept_rate_7d: 0.2,
			cancel_rate_7d: 0.4,
			recent_timeouts: 3,
			fairness_penalty: 0.0,
		};
		assert!(p_accept(&good, 1000, 300, 900) > p_accept(&bad, 1000, 300, 900));
	}
}
