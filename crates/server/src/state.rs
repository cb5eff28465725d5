use std::sync::Arc;

use harvester_core::{Config, PublicationStore, RunCoordinator, RunLogStore};

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<RunCoordinator>,
    store: Arc<dyn PublicationStore>,
    run_logs: Arc<dyn RunLogStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: Arc<RunCoordinator>,
        store: Arc<dyn PublicationStore>,
        run_logs: Arc<dyn RunLogStore>,
    ) -> Self {
        Self {
            config,
            coordinator,
            store,
            run_logs,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        self.coordinator.as_ref()
    }

    pub fn store(&self) -> &dyn PublicationStore {
        self.store.as_ref()
    }

    pub fn run_logs(&self) -> &dyn RunLogStore {
        self.run_logs.as_ref()
    }
}
