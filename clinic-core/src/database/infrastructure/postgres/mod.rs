//! PostgreSQL-backed repository implementations.

pub mod patients;
pub mod transaction;
pub mod visit_images;
pub mod visits;

pub use patients::PostgresPatientsRepository;
pub use transaction::{PostgresClinicTransaction, PostgresTransactionalStore};
pub use visit_images::PostgresVisitImagesRepository;
pub use visits::PostgresVisitsRepository;

/// Build an `ILIKE` pattern that matches `term` literally anywhere in the
/// column. `\` is the default escape character in PostgreSQL.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
