use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use clinic_core::CleanupReport;
use clinic_model::{ApiResponse, VisitId, VisitImage, VisitImageId};
use tracing::info;

use super::multipart::UploadForm;
use crate::{AppState, infra::errors::AppResult};

const IMAGE_FIELD: &str = "image";

pub async fn add_image_to_visit(
    State(state): State<AppState>,
    Path(visit_id): Path<VisitId>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<VisitImage>>> {
    let file = UploadForm::read(multipart)
        .await?
        .take_single_file(IMAGE_FIELD)?;
    let image = state
        .coordinator()
        .add_image_to_visit(visit_id, file)
        .await?;
    info!(target: "clinic.images", visit_id = %visit_id, image_id = %image.id, "image added");
    Ok(Json(
        ApiResponse::success(image).with_message("Image added successfully"),
    ))
}

pub async fn update_visit_image(
    State(state): State<AppState>,
    Path(image_id): Path<VisitImageId>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<VisitImage>>> {
    let file = UploadForm::read(multipart)
        .await?
        .take_single_file(IMAGE_FIELD)?;
    let image = state
        .coordinator()
        .update_visit_image(image_id, file)
        .await?;
    Ok(Json(
        ApiResponse::success(image).with_message("Image updated successfully"),
    ))
}

pub async fn delete_visit_image(
    State(state): State<AppState>,
    Path(image_id): Path<VisitImageId>,
) -> AppResult<Json<ApiResponse<CleanupReport>>> {
    let report = state.coordinator().delete_visit_image(image_id).await?;
    Ok(Json(
        ApiResponse::success(report).with_message("Image deleted successfully"),
    ))
}
