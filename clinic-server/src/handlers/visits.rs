use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use chrono::{DateTime, NaiveDate};
use clinic_core::CleanupReport;
use clinic_model::{ApiResponse, PatientId, Visit, VisitDetails, VisitId, VisitWithImages};
use tracing::info;

use super::multipart::UploadForm;
use crate::{
    AppState,
    infra::errors::{AppError, AppResult},
};

/// Field names accepted for the batch of visit images.
const IMAGE_FIELDS: &[&str] = &["images", "images[]"];

fn parse_visit_date(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    // A plain date, or an RFC 3339 timestamp reduced to its own date.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|ts| ts.date_naive()))
        .map_err(|_| AppError::bad_request(format!("Invalid visit_date '{raw}', expected YYYY-MM-DD")))
}

pub async fn add_visit(
    State(state): State<AppState>,
    Path(patient_id): Path<PatientId>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<VisitWithImages>>> {
    let mut form = UploadForm::read(multipart).await?;
    let visit_date = form
        .text("visit_date")
        .ok_or_else(|| AppError::bad_request("visit_date is required"))
        .and_then(parse_visit_date)?;
    let details = VisitDetails {
        visit_date,
        reason: form.text("reason").unwrap_or_default().to_string(),
    };
    let files = form.take_files(IMAGE_FIELDS);

    let visit = state
        .coordinator()
        .add_visit(patient_id, &details, files)
        .await?;
    info!(
        target: "clinic.visits",
        patient_id = %patient_id,
        visit_id = %visit.visit.id,
        images = visit.images.len(),
        "visit added"
    );
    Ok(Json(
        ApiResponse::success(visit).with_message("Visit added successfully"),
    ))
}

pub async fn update_visit(
    State(state): State<AppState>,
    Path(id): Path<VisitId>,
    Json(details): Json<VisitDetails>,
) -> AppResult<Json<ApiResponse<Visit>>> {
    let visit = state.coordinator().update_visit(id, &details).await?;
    Ok(Json(ApiResponse::success(visit)))
}

pub async fn delete_visit(
    State(state): State<AppState>,
    Path(id): Path<VisitId>,
) -> AppResult<Json<ApiResponse<CleanupReport>>> {
    let report = state.coordinator().delete_visit(id).await?;
    Ok(Json(
        ApiResponse::success(report).with_message("Visit deleted successfully"),
    ))
}
