//! Startup-time storage backend selection.

use std::sync::Arc;

use storage::implementations::file::FileStorage;
use storage::implementations::memory::MemoryStorage;
use storage::{StorageInterface, StorageService};

use crate::config::StorageConfig;

pub fn build_storage_service(config: &StorageConfig) -> Arc<StorageService> {
	let backend: Box<dyn StorageInterface> = match config.backend.as_str() {
		"file" => Box::new(FileStorage::new(config.file_base_dir.clone())),
		"memory" => Box::new(MemoryStorage::new()),
		other => {
			tracing::warn!(backend = other, "unknown storage backend, falling back to memory");
			Box::new(MemoryStorage::new())
		}
	};
	Arc::new(StorageService::new(backend))
}
