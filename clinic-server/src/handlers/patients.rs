use axum::{
    Json,
    extract::{Path, Query, State},
};
use clinic_core::CleanupReport;
use clinic_model::{ApiResponse, Patient, PatientDetails, PatientId, PatientVisits};
use serde::Deserialize;
use tracing::info;

use crate::{
    AppState,
    infra::errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
}

pub async fn create_patient(
    State(state): State<AppState>,
    Json(details): Json<PatientDetails>,
) -> AppResult<Json<ApiResponse<Patient>>> {
    let patient = state.coordinator().create_patient(&details).await?;
    info!(target: "clinic.patients", patient_id = %patient.id, "patient created");
    Ok(Json(ApiResponse::success(patient)))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<PatientId>,
    Json(details): Json<PatientDetails>,
) -> AppResult<Json<ApiResponse<Patient>>> {
    let patient = state
        .coordinator()
        .update_patient(id, &details)
        .await?
        .ok_or_else(|| AppError::not_found("Patient not found"))?;
    Ok(Json(ApiResponse::success(patient)))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<PatientId>,
) -> AppResult<Json<ApiResponse<CleanupReport>>> {
    let report = state.coordinator().delete_patient(id).await?;
    info!(
        target: "clinic.patients",
        patient_id = %id,
        destroyed = report.destroyed,
        failures = report.failures.len(),
        "patient deleted"
    );
    Ok(Json(
        ApiResponse::success(report)
            .with_message("Patient and all related data deleted successfully"),
    ))
}

pub async fn search_patients(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<Patient>>>> {
    let term = query.name.unwrap_or_default();
    let patients = state.coordinator().search_patients(&term).await?;
    Ok(Json(ApiResponse::success(patients)))
}

pub async fn get_patient_visits(
    State(state): State<AppState>,
    Path(id): Path<PatientId>,
) -> AppResult<Json<ApiResponse<PatientVisits>>> {
    let visits = state.coordinator().get_patient_visits(id).await?;
    Ok(Json(ApiResponse::success(visits)))
}
