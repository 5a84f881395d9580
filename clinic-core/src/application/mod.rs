pub mod coordinator;
pub mod unit_of_work;

pub use coordinator::{ClinicCoordinator, CoordinatorSettings};
pub use unit_of_work::ClinicUnitOfWork;
