use crate::ids::{VisitId, VisitImageId};

/// Database half of an image. The other half is the remote object named by
/// `object_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VisitImage {
    pub id: VisitImageId,
    pub visit_id: VisitId,
    pub image_url: String,
    #[cfg_attr(feature = "serde", serde(rename = "public_id"))]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "public_id"))]
    pub object_id: String,
}

/// What the media host hands back after an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoredObject {
    pub url: String,
    pub object_id: String,
}
