use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use crate::database::infrastructure::postgres::{
    PostgresPatientsRepository, PostgresTransactionalStore, PostgresVisitImagesRepository,
    PostgresVisitsRepository,
};
use crate::database::ports::{
    patients::PatientsRepository, transaction::TransactionalStore,
    visit_images::VisitImagesRepository, visits::VisitsRepository,
};
use crate::database::postgres::PostgresDatabase;

/// Every relational port the coordinator needs, behind trait objects so
/// tests can swap in the in-memory store.
#[derive(Clone)]
pub struct ClinicUnitOfWork {
    pub patients: Arc<dyn PatientsRepository>,
    pub visits: Arc<dyn VisitsRepository>,
    pub visit_images: Arc<dyn VisitImagesRepository>,
    pub transactions: Arc<dyn TransactionalStore>,
}

impl fmt::Debug for ClinicUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClinicUnitOfWork")
            .field("patients", &type_name_of_val(self.patients.as_ref()))
            .field("visits", &type_name_of_val(self.visits.as_ref()))
            .field("visit_images", &type_name_of_val(self.visit_images.as_ref()))
            .field("transactions", &type_name_of_val(self.transactions.as_ref()))
            .finish()
    }
}

impl ClinicUnitOfWork {
    pub fn from_postgres(db: &PostgresDatabase) -> Self {
        let pool = db.pool().clone();
        Self {
            patients: Arc::new(PostgresPatientsRepository::new(pool.clone())),
            visits: Arc::new(PostgresVisitsRepository::new(pool.clone())),
            visit_images: Arc::new(PostgresVisitImagesRepository::new(pool.clone())),
            transactions: Arc::new(PostgresTransactionalStore::new(pool)),
        }
    }

    /// One object implementing every port, e.g. the in-memory test store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PatientsRepository
            + VisitsRepository
            + VisitImagesRepository
            + TransactionalStore
            + 'static,
    {
        Self {
            patients: store.clone(),
            visits: store.clone(),
            visit_images: store.clone(),
            transactions: store,
        }
    }
}
