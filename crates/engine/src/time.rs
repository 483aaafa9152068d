//! Shared unix-millis helper, used throughout the engine crate.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}
