use async_trait::async_trait;
use clinic_model::{Patient, PatientDetails, PatientId};

use crate::error::Result;

/// Single-statement patient reads and writes.
#[async_trait]
pub trait PatientsRepository: Send + Sync {
    /// Insert a patient under a freshly assigned id.
    async fn create(&self, details: &PatientDetails) -> Result<Patient>;

    /// Replace name, age and gender. `None` when no such patient exists.
    async fn update(&self, id: PatientId, details: &PatientDetails) -> Result<Option<Patient>>;

    async fn get(&self, id: PatientId) -> Result<Option<Patient>>;

    /// Case-insensitive substring match on name, ordered by name ascending.
    /// An empty term matches everyone.
    async fn search_by_name(&self, term: &str) -> Result<Vec<Patient>>;
}
