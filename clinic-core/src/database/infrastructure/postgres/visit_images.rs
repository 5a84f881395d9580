use async_trait::async_trait;
use clinic_model::{StoredObject, VisitId, VisitImage, VisitImageId};
use sqlx::PgPool;

use crate::database::ports::visit_images::VisitImagesRepository;
use crate::error::{ClinicError, Result};

#[derive(Clone, Debug)]
pub struct PostgresVisitImagesRepository {
    pool: PgPool,
}

impl PostgresVisitImagesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Foreign key violations on insert mean the owning visit is gone.
pub(crate) fn map_insert_error(visit_id: VisitId, err: sqlx::Error) -> ClinicError {
    if let Some(db_err) = err.as_database_error()
        && db_err.is_foreign_key_violation()
    {
        return ClinicError::not_found(format!("visit {visit_id}"));
    }
    ClinicError::persistence("Failed to insert visit image", err)
}

#[async_trait]
impl VisitImagesRepository for PostgresVisitImagesRepository {
    async fn get(&self, id: VisitImageId) -> Result<Option<VisitImage>> {
        sqlx::query_as::<_, VisitImage>(
            "SELECT id, visit_id, image_url, public_id FROM visit_images WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to load visit image", e))
    }

    async fn list_for_visit(&self, visit_id: VisitId) -> Result<Vec<VisitImage>> {
        sqlx::query_as::<_, VisitImage>(
            r#"
            SELECT id, visit_id, image_url, public_id
            FROM visit_images
            WHERE visit_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(visit_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to list visit images", e))
    }

    async fn insert(&self, visit_id: VisitId, object: &StoredObject) -> Result<VisitImage> {
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
        .fetch_one(self.pool())
        .await
        .map_err(|e| map_insert_error(visit_id, e))
    }

    async fn replace_object(
        &self,
        id: VisitImageId,
        object: &StoredObject,
    ) -> Result<Option<VisitImage>> {
        sqlx::query_as::<_, VisitImage>(
            r#"
            UPDATE visit_images
            SET image_url = $1, public_id = $2
            WHERE id = $3
            RETURNING id, visit_id, image_url, public_id
            "#,
        )
        .bind(&object.url)
        .bind(&object.object_id)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ClinicError::persistence("Failed to update visit image", e))
    }

    async fn delete(&self, id: VisitImageId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM visit_images WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| ClinicError::persistence("Failed to delete visit image", e))?;

        Ok(result.rows_affected() > 0)
    }
}
