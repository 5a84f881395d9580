use async_trait::async_trait;
use clinic_model::{PatientId, StoredObject, Visit, VisitDetails, VisitId, VisitImage, VisitImageId};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::visit_images::map_insert_error;
use crate::database::ports::transaction::{ClinicTransaction, TransactionalStore};
use crate::error::{ClinicError, Result};

#[derive(Clone, Debug)]
pub struct PostgresTransactionalStore {
    pool: PgPool,
}

impl PostgresTransactionalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionalStore for PostgresTransactionalStore {
    async fn begin(&self) -> Result<Box<dyn ClinicTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ClinicError::persistence("Failed to start transaction", e))?;
        Ok(Box::new(PostgresClinicTransaction { tx }))
    }
}

/// Owns one pooled connection for its whole life. sqlx rolls back on drop.
#[derive(Debug)]
pub struct PostgresClinicTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresClinicTransaction {
    async fn object_ids_where(&mut self, sql: &str, owner: Uuid) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(sql)
            .bind(owner)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| ClinicError::persistence("Failed to collect image objects", e))?;

        Ok(ids.into_iter().filter(|id| !id.trim().is_empty()).collect())
    }
}

#[async_trait]
impl ClinicTransaction for PostgresClinicTransaction {
    async fn lock_patient_objects(&mut self, patient_id: PatientId) -> Result<Option<Vec<String>>> {
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM patients WHERE id = $1 FOR UPDATE")
                .bind(patient_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| ClinicError::persistence("Failed to lock patient", e))?;

        if locked.is_none() {
            return Ok(None);
        }

        // Holding the visit rows blocks new images from being attached
        // while we enumerate.
        sqlx::query("SELECT id FROM visits WHERE patient_id = $1 FOR UPDATE")
            .bind(patient_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| ClinicError::persistence("Failed to lock visits", e))?;

        let ids = self
            .object_ids_where(
                r#"
                SELECT vi.public_id
                FROM visit_images vi
                JOIN visits v ON vi.visit_id = v.id
                WHERE v.patient_id = $1
                ORDER BY vi.id
                FOR UPDATE OF vi
                "#,
                patient_id.to_uuid(),
            )
            .await?;

        Ok(Some(ids))
    }

    async fn lock_visit_objects(&mut self, visit_id: VisitId) -> Result<Option<Vec<String>>> {
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM visits WHERE id = $1 FOR UPDATE")
            .bind(visit_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| ClinicError::persistence("Failed to lock visit", e))?;

        if locked.is_none() {
            return Ok(None);
        }

        let ids = self
            .object_ids_where(
                "SELECT public_id FROM visit_images WHERE visit_id = $1 ORDER BY id FOR UPDATE",
                visit_id.to_uuid(),
            )
            .await?;

        Ok(Some(ids))
    }

    async fn insert_visit(&mut self, patient_id: PatientId, details: &VisitDetails) -> Result<Visit> {
        sqlx::query_as::<_, Visit>(
            r#"
            INSERT INTO visits (id, patient_id, visit_date, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING id, patient_id, visit_date, reason
            "#,
        )
        .bind(VisitId::new())
        .bind(patient_id)
        .bind(details.visit_date)
        .bind(&details.reason)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.is_foreign_key_violation()
            {
                return ClinicError::not_found(format!("patient {patient_id}"));
            }
            ClinicError::persistence("Failed to insert visit", e)
        })
    }

    async fn insert_visit_image(
        &mut self,
        visit_id: VisitId,
        object: &StoredObject,
    ) -> Result<VisitImage> {
        sqlx::query_as::<_, VisitImage>(
            r#"
            INSERT INTO visit_images (id, visit_id, image_url, public_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, visit_id, image_url, public_id
            "#,
        )
        .bind(VisitImageId::new())
        .bind(visit_id)
        .bind(&object.url)
        .bind(&object.object_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_insert_error(visit_id, e))
    }

    async fn delete_patient(&mut self, patient_id: PatientId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(patient_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| ClinicError::persistence("Failed to delete patient", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_visit(&mut self, visit_id: VisitId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM visits WHERE id = $1")
            .bind(visit_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| ClinicError::persistence("Failed to delete visit", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ClinicError::persistence("Failed to commit transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| ClinicError::persistence("Failed to roll back transaction", e))
    }
}
