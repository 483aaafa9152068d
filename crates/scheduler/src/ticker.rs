//! Periodic drivers: fast tick, batch tick, and the offer-expiry sweep.
//!
//! Grounded on the teacher's `SolverEngine::run()` (`tokio::select!` over
//! a handful of interval/event sources) and
//! `original_source/packages/dispatch/loops.py`'s three fixed-interval
//! ticks. Fast and batch ticks share one `SweepLock` since the
//! specification requires them serialized per region; the expiry sweep
//! gets its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use adapters::RouterAdapter;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use core_types::ApiError;
use storage::repos::TaskRepo;
use tracing::{info, warn};

use engine::OfferManager;

use crate::snapshot_builder::SnapshotBuilder;
use crate::sweep_lock::SweepLock;
use crate::ticks::{run_batch_tick, run_fast_tick, TickResult};

const MAX_TICK_ATTEMPTS: u32 = 3;
const EXPIRY_SWEEP_LIMIT: usize = 200;

/// Tick cadence, configurable via `[scheduler]` in `Config` rather than
/// hardcoded, matching spec.md §4.13's 3 s / 30 s / 15 s defaults.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerIntervals {
	pub fast_tick: Duration,
	pub batch_tick: Duration,
	pub expiry_sweep: Duration,
}

impl Default for SchedulerIntervals {
	fn default() -> Self {
		Self {
			fast_tick: Duration::from_secs(3),
			batch_tick: Duration::from_secs(30),
			expiry_sweep: Duration::from_secs(15),
		}
	}
}

/// Retries `op` with exponential backoff up to `max_attempts` times,
/// matching the specification's "retries with bounded attempts on
/// exceptions" requirement for scheduled ticks.
async fn run_with_retries<F, Fut, T>(mut op: F, max_attempts: u32) -> Result<T, ApiError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ApiError>>,
{
	let mut backoff = ExponentialBackoffBuilder::new().build();
	let mut attempt = 0u32;
	loop {
		attempt += 1;
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) if attempt >= max_attempts => return Err(err),
			Err(err) => {
				warn!(attempt, error = %err, "tick attempt failed, retrying");
				match backoff.next_backoff() {
					Some(delay) => tokio::time::sleep(delay).await,
					None => return Err(err),
				}
			}
		}
	}
}

pub struct DispatchScheduler {
	snapshot_builder: Arc<SnapshotBuilder>,
	router: Arc<dyn RouterAdapter>,
	task_repo: Arc<TaskRepo>,
	offers: Arc<OfferManager>,
	fast_batch_lock: Arc<dyn SweepLock>,
	expiry_lock: Arc<dyn SweepLock>,
	intervals: SchedulerIntervals,
}

impl DispatchScheduler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		snapshot_builder: Arc<SnapshotBuilder>,
		router: Arc<dyn RouterAdapter>,
		task_repo: Arc<TaskRepo>,
		offers: Arc<OfferManager>,
		fast_batch_lock: Arc<dyn SweepLock>,
		expiry_lock: Arc<dyn SweepLock>,
		intervals: SchedulerIntervals,
	) -> Self {
		Self { snapshot_builder, router, task_repo, offers, fast_batch_lock, expiry_lock, intervals }
	}

	async fn fast_tick_once(&self) -> Result<TickResult, ApiError> {
		if !self.fast_batch_lock.try_lock() {
			return Ok(TickResult::default());
		}
		let outcome = run_with_retries(
			|| async {
				let now = now_ms();
				let snapshot = self.snapshot_builder.build(now).await.map_err(|e| ApiError::Internal { message: e.to_string() })?;
				run_fast_tick(&snapshot, self.router.as_ref(), &self.task_repo, &self.offers).await
			},
			MAX_TICK_ATTEMPTS,
		)
		.await;
		self.fast_batch_lock.unlock();
		outcome
	}

	async fn batch_tick_once(&self) -> Result<TickResult, ApiError> {
		if !self.fast_batch_lock.try_lock() {
			return Ok(TickResult::default());
		}
		let outcome = run_with_retries(
			|| async {
				let now = now_ms();
				let snapshot = self.snapshot_builder.build(now).await.map_err(|e| ApiError::Internal { message: e.to_string() })?;
				run_batch_tick(&snapshot, self.router.as_ref(), &self.task_repo, &self.offers).await
			},
			MAX_TICK_ATTEMPTS,
		)
		.await;
		self.fast_batch_lock.unlock();
		outcome
	}

	async fn expiry_sweep_once(&self) {
		if !self.expiry_lock.try_lock() {
			return;
		}
		match self.offers.expire_offers(EXPIRY_SWEEP_LIMIT).await {
			Ok(result) => {
				if result.expired_tasks > 0 {
					info!(expired = result.expired_tasks, "offer expiry sweep");
				}
			}
			Err(err) => warn!(error = %err, "offer expiry sweep failed"),
		}
		self.expiry_lock.unlock();
	}

	/// Runs all three ticks on their fixed intervals until cancelled.
	pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
		let mut fast = tokio::time::interval(self.intervals.fast_tick);
		let mut batch = tokio::time::interval(self.intervals.batch_tick);
		let mut expiry = tokio::time::interval(self.intervals.expiry_sweep);

		loop {
			tokio::select! {
				_ = fast.tick() => {
					match self.fast_tick_once().await {
						Ok(result) if result.offers_created > 0 => {
							info!(offers = result.offers_created, candidates = result.candidates, "fast tick");
						}
						Ok(_) => {}
						Err(err) => warn!(error = %err, "fast tick failed"),
					}
				}
				_ = batch.tick() => {
					match self.batch_tick_once().await {
						Ok(result) if result.offers_created > 0 => {
							info!(offers = result.offers_created, "batch tick");
						}
						Ok(_) => {}
						Err(err) => warn!(error = %err, "batch tick failed"),
					}
				}
				_ = expiry.tick() => {
					self.expiry_sweep_once().await;
				}
				_ = shutdown.changed() => {
					if *shutdown.borrow() {
						break;
					}
				}
			}
		}
	}
}

fn now_ms() -> u64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
