//! # Clinic Server
//!
//! HTTP surface of the clinic records backend: patients, their visits and
//! the images attached to each visit. Every write that touches the media
//! host goes through [`clinic_core::ClinicCoordinator`].

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
