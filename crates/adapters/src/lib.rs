//! External vendor contracts: verification, payment, and routing.
//!
//! Grounded on the teacher's adapter-trait-plus-registry pattern
//! (`solver_storage::StorageInterface` + `ImplementationRegistry`): a
//! narrow async trait per vendor concern, with a small set of concrete
//! implementations selected once at startup by an environment variable —
//! `IDV_VENDOR`, `PAYMENT_PROCESSOR`, `ROUTER_MODE` per spec §6 — never
//! dispatched per call.

pub mod implementations {
	pub mod payment_fake;
	pub mod router_cache;
	pub mod router_fake;
	pub mod verification_fake;
}

pub mod payment;
pub mod router;
pub mod verification;

pub use payment::{PaymentAdapter, PaymentError, PaymentResult};
pub use router::{RouterAdapter, RouterError};
pub use verification::{VerificationAdapter, VerificationError, VerificationOutcome};
