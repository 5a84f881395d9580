use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use clinic_core::ClinicError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<ClinicError> for AppError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::NotFound(what) => Self::not_found(format!("Not found: {what}")),
            ClinicError::InvalidInput(msg) => Self::bad_request(msg),
            ClinicError::Upload(e) => {
                tracing::warn!(error = %e, "media upload failed");
                Self::bad_gateway(format!("Image upload failed: {e}"))
            }
            err @ ClinicError::Inconsistent { .. } => {
                tracing::error!(error = %err, "operation left stores out of sync");
                Self::internal(err.to_string())
            }
            ClinicError::Persistence(msg) => {
                tracing::error!(error = %msg, "database operation failed");
                Self::internal("Database operation failed")
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::media_store::MediaStoreError;

    #[test]
    fn clinic_errors_map_to_statuses() {
        let cases = [
            (ClinicError::not_found("patient x"), StatusCode::NOT_FOUND),
            (ClinicError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                ClinicError::Upload(MediaStoreError::Timeout),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ClinicError::Persistence("pool timed out".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn inconsistency_names_objects_and_persistence_hides_details() {
        let err = AppError::from(ClinicError::Inconsistent {
            reason: "commit failed".into(),
            object_ids: vec!["clinic_images/a".into()],
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("clinic_images/a"));

        let err = AppError::from(ClinicError::Persistence("password=hunter2".into()));
        assert_eq!(err.message, "Database operation failed");
    }
}
