//! `RouterAdapter` contract: road-graph ETA (delegated, per spec.md's own
//! Non-goals — full routing is out of scope, only the interface is ours).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
	pub lat: f64,
	pub lng: f64,
}

#[derive(Debug, Error)]
pub enum RouterError {
	#[error("router unreachable: {0}")]
	Transport(String),
	#[error("router deadline exceeded")]
	Timeout,
}

/// Thin contract over a routing vendor (e.g. OSRM).
#[async_trait]
pub trait RouterAdapter: Send + Sync {
	/// Point-to-point travel time in seconds.
	async fn route_time_latlng(&self, a: LatLng, b: LatLng) -> Result<u32, RouterError>;

	/// Full N×N travel-time matrix in seconds, used by the batch planner.
	async fn batch_matrix(&self, points: &[LatLng]) -> Result<Vec<Vec<u32>>, RouterError> {
		let mut matrix = vec![vec![0u32; points.len()]; points.len()];
		for (i, a) in points.iter().enumerate() {
			for (j, b) in points.iter().enumerate() {
				if i != j {
					matrix[i][j] = self.route_time_latlng(*a, *b).await?;
				}
			}
		}
		Ok(matrix)
	}
}
