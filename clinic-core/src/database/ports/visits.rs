use async_trait::async_trait;
use clinic_model::{PatientId, Visit, VisitDetails, VisitId};

use crate::error::Result;

#[async_trait]
pub trait VisitsRepository: Send + Sync {
    async fn get(&self, id: VisitId) -> Result<Option<Visit>>;

    /// Visits of one patient, most recent `visit_date` first.
    async fn list_for_patient(&self, patient_id: PatientId) -> Result<Vec<Visit>>;

    /// Update date and reason. The owning patient never changes.
    async fn update(&self, id: VisitId, details: &VisitDetails) -> Result<Option<Visit>>;
}
