use chrono::NaiveDate;

use crate::{
    ids::{PatientId, VisitId},
    image::VisitImage,
};

/// A visit. `patient_id` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Visit {
    pub id: VisitId,
    pub patient_id: PatientId,
    pub visit_date: NaiveDate,
    pub reason: String,
}

/// The fields a visit may be created with or updated to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisitDetails {
    pub visit_date: NaiveDate,
    #[cfg_attr(feature = "serde", serde(default))]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisitWithImages {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub visit: Visit,
    pub images: Vec<VisitImage>,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::ids::VisitImageId;

    #[test]
    fn visit_with_images_serializes_flat() {
        let visit = Visit {
            id: VisitId::new(),
            patient_id: PatientId::new(),
            visit_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            reason: "checkup".into(),
        };
        let image = VisitImage {
            id: VisitImageId::new(),
            visit_id: visit.id,
            image_url: "https://media.example/a.png".into(),
            object_id: "clinic_images/a".into(),
        };
        let value = serde_json::to_value(VisitWithImages {
            visit: visit.clone(),
            images: vec![image],
        })
        .unwrap();

        assert_eq!(value["reason"], "checkup");
        assert_eq!(value["visit_date"], "2024-01-01");
        assert_eq!(value["images"][0]["public_id"], "clinic_images/a");
        assert!(value.get("visit").is_none());
    }
}
