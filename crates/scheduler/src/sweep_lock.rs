//! Best-effort advisory lock so only one tick of the expiry sweep runs at
//! a time.
//!
//! `original_source/packages/dispatch/expire.py` takes a Postgres advisory
//! lock (`pg_try_advisory_lock`) before sweeping, since multiple worker
//! processes could race on the same table. This port runs the sweep from
//! a single in-process scheduler task, so an atomic flag is enough to
//! reproduce the same non-blocking "someone else has it, skip this tick"
//! semantics without a database round-trip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A lock that is acquired without blocking; failure to acquire means
/// "someone else already has it, skip this tick" rather than an error.
pub trait SweepLock: Send + Sync {
	/// Attempts to acquire the lock, returning `true` if uncontended.
	fn try_lock(&self) -> bool;

	/// Releases a previously acquired lock.
	fn unlock(&self);
}

/// In-process advisory lock backed by an atomic flag.
#[derive(Clone, Default)]
pub struct InProcessSweepLock {
	held: Arc<AtomicBool>,
}

impl InProcessSweepLock {
	pub fn new() -> Self {
		Self::default()
	}
}

impl SweepLock for InProcessSweepLock {
	fn try_lock(&self) -> bool {
		self.held
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	fn unlock(&self) {
		self.held.store(false, Ordering::Release);
	}
}
