//! Repository ports (interfaces) for the patient/visit/image aggregate.
//! Application code only sees these; PostgreSQL adapters live under
//! `database::infrastructure::postgres`.

pub mod patients;
pub mod transaction;
pub mod visit_images;
pub mod visits;
