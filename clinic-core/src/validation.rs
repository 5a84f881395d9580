use clinic_model::PatientDetails;

use crate::error::{ClinicError, Result};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_GENDER_LEN: usize = 10;
pub const MAX_AGE: i32 = 150;

/// Checks that mirror the column constraints, so a bad payload is a 400
/// rather than a database error. Returns the trimmed details that were
/// checked; those are what gets stored.
pub fn validate_patient(details: &PatientDetails) -> Result<PatientDetails> {
    let name = details.name.trim();
    if name.is_empty() {
        return Err(ClinicError::InvalidInput("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ClinicError::InvalidInput(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if !(0..=MAX_AGE).contains(&details.age) {
        return Err(ClinicError::InvalidInput(format!(
            "age must be between 0 and {MAX_AGE}"
        )));
    }
    let gender = details.gender.trim();
    if gender.chars().count() > MAX_GENDER_LEN {
        return Err(ClinicError::InvalidInput(format!(
            "gender must be at most {MAX_GENDER_LEN} characters"
        )));
    }
    Ok(PatientDetails {
        name: name.to_string(),
        age: details.age,
        gender: gender.to_string(),
    })
}

/// An uploaded image must carry at least one byte.
pub fn require_image(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(ClinicError::InvalidInput("image file is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, age: i32, gender: &str) -> PatientDetails {
        PatientDetails {
            name: name.into(),
            age,
            gender: gender.into(),
        }
    }

    #[test]
    fn accepts_ordinary_patient() {
        assert!(validate_patient(&details("Ali", 30, "M")).is_ok());
    }

    #[test]
    fn rejects_blank_name_and_out_of_range_age() {
        assert!(matches!(
            validate_patient(&details("   ", 30, "M")),
            Err(ClinicError::InvalidInput(_))
        ));
        assert!(validate_patient(&details("Ali", -1, "M")).is_err());
        assert!(validate_patient(&details("Ali", 151, "M")).is_err());
        assert!(validate_patient(&details(&"x".repeat(101), 30, "M")).is_err());
        assert!(validate_patient(&details("Ali", 30, "unspecified")).is_err());
    }

    #[test]
    fn padding_is_trimmed_before_length_checks() {
        let padded = format!("Ali{}", " ".repeat(200));
        let checked = validate_patient(&details(&padded, 30, " F ")).unwrap();
        assert_eq!(checked.name, "Ali");
        assert_eq!(checked.gender, "F");
    }

    #[test]
    fn empty_image_is_invalid() {
        assert!(require_image(&[]).is_err());
        assert!(require_image(b"\x89PNG").is_ok());
    }
}
