use crate::{ids::PatientId, visit::VisitWithImages};

/// A patient record. Owns zero or more visits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: i32,
    pub gender: String,
}

/// Full replacement payload for the mutable patient fields.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatientDetails {
    pub name: String,
    pub age: i32,
    pub gender: String,
}

impl Patient {
    pub fn from_details(id: PatientId, details: PatientDetails) -> Self {
        Self {
            id,
            name: details.name,
            age: details.age,
            gender: details.gender,
        }
    }
}

/// One patient together with every visit and the images of each visit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatientVisits {
    pub patient: Patient,
    pub visits: Vec<VisitWithImages>,
}
