use std::{fmt, sync::Arc};

use clinic_core::ClinicCoordinator;
use clinic_core::database::PostgresDatabase;

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: ClinicCoordinator,
    /// Absent when the app runs over in-memory stores.
    pub postgres: Option<Arc<PostgresDatabase>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        coordinator: ClinicCoordinator,
        postgres: Option<Arc<PostgresDatabase>>,
    ) -> Self {
        Self {
            config,
            coordinator,
            postgres,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &ClinicCoordinator {
        &self.coordinator
    }
}
