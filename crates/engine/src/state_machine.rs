//! Pure state-transition table for [`OrderStatus`].
//!
//! Grounded on `original_source/packages/core/state_machine.py`: a single
//! `ALLOWED` adjacency map, consulted by a free function rather than
//! mutating an order in place.

use core_types::OrderStatus;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot transition {from:?} -> {to:?}")]
pub struct InvalidStateTransition {
	pub from: OrderStatus,
	pub to: OrderStatus,
}

fn allowed(from: OrderStatus) -> &'static [OrderStatus] {
	use OrderStatus::*;
	match from {
		Created => &[VerifyingAge, Canceled],
		VerifyingAge => &[PaymentAuth, Canceled],
		PaymentAuth => &[PendingMerchant, Canceled],
		PendingMerchant => &[MerchantAccepted, Canceled],
		MerchantAccepted => &[Dispatching, Canceled],
		Dispatching => &[Pickup, Canceled],
		Pickup => &[EnRoute, Canceled],
		EnRoute => &[DoorstepVerify, Canceled],
		DoorstepVerify => &[Delivered, RefusedReturning],
		RefusedReturning => &[RefusedReturning],
		Delivered => &[Delivered],
		Canceled => &[Canceled],
	}
}

/// Attempts `from -> to`. Never mutates anything — the order itself is
/// updated by the caller once this returns `Ok`.
pub fn transition(from: OrderStatus, to: OrderStatus) -> Result<OrderStatus, InvalidStateTransition> {
	if allowed(from).contains(&to) {
		Ok(to)
	} else {
		Err(InvalidStateTransition { from, to })
	}
}

/// Best-effort variant for cascades that should silently no-op on an
/// invalid transition rather than surface an error (spec's own
/// "suppressed `InvalidStateTransition`" cascades, narrowed to `Option`
/// instead of swallowing an exception).
pub fn try_transition(from: OrderStatus, to: OrderStatus) -> Option<OrderStatus> {
	transition(from, to).ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use core_types::OrderStatus::*;

	#[test]
	fn happy_path_chain_is_allowed() {
		let chain = [
			(Created, VerifyingAge),
			(VerifyingAge, PaymentAuth),
			(PaymentAuth, PendingMerchant),
			(PendingMerchant, MerchantAccepted),
			(MerchantAccepted, Dispatching),
			(Dispatching, Pickup),
			(Pickup, EnRoute),
			(EnRoute, DoorstepVerify),
			(DoorstepVerify, Delivered),
		];
		for (from, to) in chain {
			assert_eq!(transition(from, to), Ok(to));
		}
	}

	#[test]
	fn skipping_a_stage_is_rejected() {
		assert!(transition(Created, PaymentAuth).is_err());
	}

	#[test]
	fn terminal_states_are_self_only() {
		assert_eq!(transition(Delivered, Delivered), Ok(Delivered));
		assert!(transition(Delivered, Canceled).is_err());
		assert!(transition(Canceled, VerifyingAge).is_err());
	}

	#[test]
	fn doorstep_verify_may_end_in_refusal() {
		assert_eq!(transition(DoorstepVerify, RefusedReturning), Ok(RefusedReturning));
	}

	#[test]
	fn try_transition_suppresses_the_error() {
		assert_eq!(try_transition(Created, PaymentAuth), None);
		assert_eq!(try_transition(Created, VerifyingAge), Some(VerifyingAge));
	}
}
