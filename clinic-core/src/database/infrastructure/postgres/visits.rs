use async_trait::async_trait;
use clinic_model::{PatientId, Visit, VisitDetails, VisitId};
use sqlx::PgPool;

use crate::database::ports::visits::VisitsRepository;
use crate::error::{ClinicError, Result};

#[derive(Clone, Debug)]
pub struct PostgresVisitsRepository {
    pool: PgPool,
}

impl PostgresVisitsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl VisitsRepository for PostgresVisitsRepository {
    async fn get(&self, id: VisitId) -> Result<Option<Visit>> {
        sqlx::query_as::<_, Visit>(
            "SELECT id, patient_id, visit_date, reason FROM visits WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to load visit", e))
    }

    async fn list_for_patient(&self, patient_id: PatientId) -> Result<Vec<Visit>> {
        sqlx::query_as::<_, Visit>(
            r#"
            SELECT id, patient_id, visit_date, reason
            FROM visits
            WHERE patient_id = $1
            ORDER BY visit_date DESC, id DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to list visits", e))
    }

    async fn update(&self, id: VisitId, details: &VisitDetails) -> Result<Option<Visit>> {
        sqlx::query_as::<_, Visit>(
            r#"
            UPDATE visits
            SET visit_date = $1, reason = $2
            WHERE id = $3
            RETURNING id, patient_id, visit_date, reason
            "#,
        )
        .bind(details.visit_date)
        .bind(&details.reason)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to update visit", e))
    }
}
