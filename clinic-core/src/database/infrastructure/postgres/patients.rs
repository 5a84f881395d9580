use async_trait::async_trait;
use clinic_model::{Patient, PatientDetails, PatientId};
use sqlx::PgPool;

use super::contains_pattern;
use crate::database::ports::patients::PatientsRepository;
use crate::error::{ClinicError, Result};

/// PostgreSQL-backed implementation of the `PatientsRepository` port.
#[derive(Clone, Debug)]
pub struct PostgresPatientsRepository {
    pool: PgPool,
}

impl PostgresPatientsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PatientsRepository for PostgresPatientsRepository {
    async fn create(&self, details: &PatientDetails) -> Result<Patient> {
        sqlx::query_as::<_, Patient>(
            r#"
            INSERT INTO patients (id, name, age, gender)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, age, gender
            "#,
        )
        .bind(PatientId::new())
        .bind(&details.name)
        .bind(details.age)
        .bind(&details.gender)
        .fetch_one(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to create patient", e))
    }

    async fn update(&self, id: PatientId, details: &PatientDetails) -> Result<Option<Patient>> {
        sqlx::query_as::<_, Patient>(
            r#"
            UPDATE patients
            SET name = $1, age = $2, gender = $3
            WHERE id = $4
            RETURNING id, name, age, gender
            "#,
        )
        .bind(&details.name)
        .bind(details.age)
        .bind(&details.gender)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to update patient", e))
    }

    async fn get(&self, id: PatientId) -> Result<Option<Patient>> {
        sqlx::query_as::<_, Patient>("SELECT id, name, age, gender FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| ClinicError::persistence("Failed to load patient", e))
    }

    async fn search_by_name(&self, term: &str) -> Result<Vec<Patient>> {
        sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, name, age, gender
            FROM patients
            WHERE name ILIKE $1
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(contains_pattern(term))
        .fetch_all(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Patient search failed", e))
    }
}
