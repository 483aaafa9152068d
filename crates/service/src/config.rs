//! Service configuration, loaded from a TOML file.
//!
//! Grounded on `solver-config`'s `Config`/section-struct layout and its
//! `#[serde(default = "...")]` pattern for defaulted fields
//! (`monitoring_timeout_minutes`, `min_confirmations`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dispatch::DispatchParams;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("io error reading {path}: {source}")]
	Io { path: String, source: std::io::Error },
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub storage: StorageConfig,
	#[serde(default)]
	pub adapters: AdaptersConfig,
	#[serde(default)]
	pub dispatch: DispatchParams,
	#[serde(default)]
	pub scheduler: SchedulerConfig,
	#[serde(default)]
	pub api: ApiConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			storage: StorageConfig::default(),
			adapters: AdaptersConfig::default(),
			dispatch: DispatchParams::default(),
			scheduler: SchedulerConfig::default(),
			api: ApiConfig::default(),
		}
	}
}

impl Config {
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
			path: path.to_string(),
			source: e,
		})?;
		Ok(toml::from_str(&content)?)
	}
}

/// Which `StorageInterface` backend to use. Matches `IDV_VENDOR`-style
/// env selection in spirit, but for storage (spec §6's "database URL").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// "memory" or "file".
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	/// Base directory for the "file" backend.
	#[serde(default = "default_file_base_dir")]
	pub file_base_dir: String,
}

fn default_storage_backend() -> String {
	"memory".to_string()
}

fn default_file_base_dir() -> String {
	"./data".to_string()
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self { backend: default_storage_backend(), file_base_dir: default_file_base_dir() }
	}
}

/// Vendor selection, read from config with environment overrides applied
/// in `main.rs` — mirrors spec §6's `IDV_VENDOR` / `PAYMENT_PROCESSOR` /
/// `ROUTER_MODE` env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdaptersConfig {
	#[serde(default = "default_idv_vendor")]
	pub idv_vendor: String,
	#[serde(default = "default_payment_processor")]
	pub payment_processor: String,
	#[serde(default = "default_router_mode")]
	pub router_mode: String,
}

fn default_idv_vendor() -> String {
	"fake".to_string()
}

fn default_payment_processor() -> String {
	"fake".to_string()
}

fn default_router_mode() -> String {
	"straight_line".to_string()
}

impl Default for AdaptersConfig {
	fn default() -> Self {
		Self {
			idv_vendor: default_idv_vendor(),
			payment_processor: default_payment_processor(),
			router_mode: default_router_mode(),
		}
	}
}

/// Fixed-interval tick cadence, in seconds as configured; converted to
/// `scheduler::SchedulerIntervals` when wiring up the scheduler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
	#[serde(default = "default_fast_tick_s")]
	pub fast_tick_s: u64,
	#[serde(default = "default_batch_tick_s")]
	pub batch_tick_s: u64,
	#[serde(default = "default_expiry_sweep_s")]
	pub expiry_sweep_s: u64,
}

fn default_fast_tick_s() -> u64 {
	3
}

fn default_batch_tick_s() -> u64 {
	30
}

fn default_expiry_sweep_s() -> u64 {
	15
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			fast_tick_s: default_fast_tick_s(),
			batch_tick_s: default_batch_tick_s(),
			expiry_sweep_s: default_expiry_sweep_s(),
		}
	}
}

impl From<&SchedulerConfig> for scheduler::SchedulerIntervals {
	fn from(c: &SchedulerConfig) -> Self {
		scheduler::SchedulerIntervals {
			fast_tick: Duration::from_secs(c.fast_tick_s),
			batch_tick: Duration::from_secs(c.batch_tick_s),
			expiry_sweep: Duration::from_secs(c.expiry_sweep_s),
		}
	}
}

/// HTTP API bind address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

fn default_host() -> String {
	"127.0.0.1".to_string()
}

fn default_port() -> u16 {
	8080
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self { host: default_host(), port: default_port() }
	}
}
