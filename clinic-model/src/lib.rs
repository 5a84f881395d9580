//! Core data model definitions shared across the clinic crates.
#![allow(missing_docs)]

pub mod api;
pub mod ids;
pub mod image;
pub mod patient;
pub mod visit;

pub use api::ApiResponse;
pub use ids::{PatientId, VisitId, VisitImageId};
pub use image::{StoredObject, VisitImage};
pub use patient::{Patient, PatientDetails, PatientVisits};
pub use visit::{Visit, VisitDetails, VisitWithImages};
