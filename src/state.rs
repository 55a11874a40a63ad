use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::UpdaterConfig;
use crate::update_log::UpdateLog;
use crate::updater::{Orchestrator, UpdateTrigger};

/// Shared application state, managed by Tauri as `Arc<AppState>`.
pub struct AppState {
    pub trigger: Arc<UpdateTrigger>,
    pub update_log: Arc<UpdateLog>,
    pub config: RwLock<UpdaterConfig>,
    /// Rebuilt when the timing preferences change; flows already running
    /// keep the instance they started with.
    orchestrator: RwLock<Arc<Orchestrator>>,
}

impl AppState {
    pub fn new(config: UpdaterConfig, update_log: Arc<UpdateLog>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            trigger: Arc::new(UpdateTrigger::new()),
            update_log,
            config: RwLock::new(config),
            orchestrator: RwLock::new(orchestrator),
        }
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.read().clone()
    }

    pub fn replace_orchestrator(&self, orchestrator: Arc<Orchestrator>) {
        *self.orchestrator.write() = orchestrator;
    }
}
