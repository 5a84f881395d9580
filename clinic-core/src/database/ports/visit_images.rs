use async_trait::async_trait;
use clinic_model::{StoredObject, VisitId, VisitImage, VisitImageId};

use crate::error::Result;

/// Non-transactional access to the database half of visit images.
#[async_trait]
pub trait VisitImagesRepository: Send + Sync {
    async fn get(&self, id: VisitImageId) -> Result<Option<VisitImage>>;

    async fn list_for_visit(&self, visit_id: VisitId) -> Result<Vec<VisitImage>>;

    async fn insert(&self, visit_id: VisitId, object: &StoredObject) -> Result<VisitImage>;

    /// Point an existing row at a different remote object.
    async fn replace_object(
        &self,
        id: VisitImageId,
        object: &StoredObject,
    ) -> Result<Option<VisitImage>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: VisitImageId) -> Result<bool>;
}
