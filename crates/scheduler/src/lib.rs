//! Periodic dispatch scheduler: wires `dispatch`'s pure matching functions
//! and `engine::OfferManager` to persisted state on fixed-interval ticks.

pub mod geocode;
pub mod snapshot_builder;
pub mod sweep_lock;
pub mod ticker;
pub mod ticks;

pub use crate::geocode::{DeterministicGeoDirectory, GeoDirectory, StaticGeoDirectory};
pub use crate::snapshot_builder::SnapshotBuilder;
pub use crate::sweep_lock::{InProcessSweepLock, SweepLock};
pub use crate::ticker::{DispatchScheduler, SchedulerIntervals};
