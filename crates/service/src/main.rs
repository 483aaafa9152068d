//! Entry point for the core transactional service: order lifecycle,
//! offers, and the dispatch scheduler behind one HTTP API.
//!
//! Grounded on `solver-service/src/main.rs`'s CLI-args-then-tracing-then-
//! config-then-run shape and its `tokio::select!` between the engine and
//! the API server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

mod adapters_factory;
mod app_state;
mod config;
mod server;
mod storage_factory;

use config::Config;

/// Command-line arguments for the service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file.
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error).
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
	fmt().with_env_filter(env_filter).with_thread_ids(true).with_target(true).init();

	let config = match Config::from_file(args.config.to_str().unwrap_or("config.toml")) {
		Ok(config) => config,
		Err(err) => {
			tracing::warn!(error = %err, "no usable config file, starting with defaults");
			Config::default()
		}
	};

	tracing::info!("starting core service");

	let app_state::Services { state, scheduler } = app_state::build_services(&config);
	let api_config = config.api.clone();

	let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
	let scheduler_task = {
		let scheduler = Arc::clone(&scheduler);
		tokio::spawn(async move { scheduler.run(shutdown_rx).await })
	};

	let server_task = server::serve(api_config, state);

	tokio::select! {
		result = server_task => {
			tracing::info!("API server finished");
			result?;
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("shutdown signal received");
		}
	}

	let _ = shutdown_tx.send(true);
	let _ = scheduler_task.await;

	tracing::info!("stopped core service");
	Ok(())
}
