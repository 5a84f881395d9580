//! # Clinic Core
//!
//! Persistence, media hosting and the consistency protocol that keeps the
//! two in step for the clinic records backend.
//!
//! - [`media_store`]: upload/destroy against the remote media host.
//! - [`database`]: repository ports, PostgreSQL adapters and the pool.
//! - [`application`]: the coordinator that runs every operation touching
//!   both stores, and the unit of work it is built on.
//! - [`consistency`]: cleanup reports and drift counters.
//!
//! ## Feature Flags
//!
//! - `test-support`: in-memory stores with failure injection
//! - `e2e`: tests against a live PostgreSQL

pub mod application;
pub mod consistency;
pub mod database;
pub mod error;
pub mod media_store;
pub mod validation;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use application::{ClinicCoordinator, ClinicUnitOfWork, CoordinatorSettings};
pub use consistency::{CleanupReport, ConsistencyMetrics, ConsistencySnapshot, DestroyFailure};
pub use error::{ClinicError, Result};

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
