//! Client side of the remote media host that owns the image bytes.
//!
//! The host has no transactions and knows nothing about our schema, so the
//! coordinator treats every call here as an independent, fallible network
//! round trip.

mod cloudinary;

pub use cloudinary::{CloudinaryMediaStore, CloudinarySettings};

use async_trait::async_trait;
use bytes::Bytes;
pub use clinic_model::StoredObject;

#[derive(Debug, thiserror::Error)]
pub enum MediaStoreError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("media host rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("media host did not answer in time")]
    Timeout,

    #[error("unexpected media host response: {0}")]
    InvalidResponse(String),
}

impl MediaStoreError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}

/// Result of a destroy call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed,
    /// The host had no such object; treated as already clean.
    NotFound,
    /// Empty identifier, nothing was sent.
    Skipped,
}

/// Upload and destroy against the media host.
///
/// Implementations must be safe to call concurrently and must not keep
/// per-call state between invocations.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Push an in-memory buffer to the host under the configured namespace.
    async fn upload(&self, bytes: Bytes) -> Result<StoredObject, MediaStoreError>;

    /// Remove a remote object by its provider identifier. Blank ids return
    /// [`DestroyOutcome::Skipped`] without touching the network.
    async fn destroy(&self, object_id: &str) -> Result<DestroyOutcome, MediaStoreError>;
}

/// Whether `object_id` names something worth a remote call.
pub fn is_destroyable(object_id: &str) -> bool {
    !object_id.trim().is_empty()
}
