//! In-memory stand-ins for both stores, with failure injection. Compiled
//! for this crate's tests and for dependents through `test-support`.

mod media_store;
mod memory_store;

pub use media_store::ScriptedMediaStore;
pub use memory_store::MemoryClinicStore;

use std::sync::Arc;

use crate::application::{ClinicCoordinator, ClinicUnitOfWork, CoordinatorSettings};

/// Coordinator over fresh in-memory stores, returned together with the
/// stores for inspection.
pub fn in_memory_coordinator() -> (ClinicCoordinator, Arc<MemoryClinicStore>, Arc<ScriptedMediaStore>) {
    in_memory_coordinator_with(CoordinatorSettings::default())
}

pub fn in_memory_coordinator_with(
    settings: CoordinatorSettings,
) -> (ClinicCoordinator, Arc<MemoryClinicStore>, Arc<ScriptedMediaStore>) {
    let store = Arc::new(MemoryClinicStore::new());
    let media = Arc::new(ScriptedMediaStore::new());
    let coordinator = ClinicCoordinator::new(
        ClinicUnitOfWork::from_store(store.clone()),
        media.clone(),
        settings,
    );
    (coordinator, store, media)
}
