use async_trait::async_trait;
use clinic_model::{PatientId, StoredObject, Visit, VisitDetails, VisitId, VisitImage};

use crate::error::Result;

/// Opens scoped transactions on a dedicated connection.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ClinicTransaction>>;
}

/// A unit of relational work that is either committed or rolled back as a
/// whole.
///
/// Dropping the transaction without calling [`ClinicTransaction::commit`]
/// rolls it back and hands the connection back to the pool, so early
/// returns through `?` never leak a connection or leave partial rows.
#[async_trait]
pub trait ClinicTransaction: Send {
    /// Lock the patient row and its visits against concurrent writers and
    /// return the provider ids of every image under them. Empty ids are
    /// left out. `None` if the patient does not exist.
    async fn lock_patient_objects(&mut self, patient_id: PatientId) -> Result<Option<Vec<String>>>;

    /// Same as [`ClinicTransaction::lock_patient_objects`] for one visit.
    async fn lock_visit_objects(&mut self, visit_id: VisitId) -> Result<Option<Vec<String>>>;

    async fn insert_visit(&mut self, patient_id: PatientId, details: &VisitDetails) -> Result<Visit>;

    async fn insert_visit_image(
        &mut self,
        visit_id: VisitId,
        object: &StoredObject,
    ) -> Result<VisitImage>;

    /// Delete the patient row; the schema cascades to visits and images.
    async fn delete_patient(&mut self, patient_id: PatientId) -> Result<bool>;

    /// Delete the visit row; the schema cascades to its images.
    async fn delete_visit(&mut self, visit_id: VisitId) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
