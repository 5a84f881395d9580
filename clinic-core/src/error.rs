use thiserror::Error;

use crate::media_store::MediaStoreError;

#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Upload failed: {0}")]
    Upload(#[from] MediaStoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The relational store and the media store disagree and nothing in
    /// this process will fix it. `object_ids` are the remote objects whose
    /// state no longer matches their rows.
    #[error("Stores out of sync ({reason}); reconcile objects: {}", object_ids.join(", "))]
    Inconsistent {
        reason: String,
        object_ids: Vec<String>,
    },
}

impl ClinicError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{context}: {err}"))
    }
}

impl From<sqlx::Error> for ClinicError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".into()),
            other => Self::Persistence(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClinicError>;
