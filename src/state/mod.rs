//! Shared application state for the HTTP surface and the supervisor.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::AppConfig;
use crate::events::EventBus;
use crate::memory::MemoryStore;

/// Cloneable handle to everything the process root owns.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub config_path: PathBuf,
    pub memory: Arc<MemoryStore>,
    pub bus: EventBus,
    pub logs_dir: PathBuf,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        config_path: PathBuf,
        memory: Arc<MemoryStore>,
        bus: EventBus,
    ) -> Self {
        let logs_dir = config.logs_dir.clone();
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            memory,
            bus,
            logs_dir,
        }
    }

    /// Snapshot of the current configuration.
    pub fn config_snapshot(&self) -> AppConfig {
        self.config.read().clone()
    }
}
