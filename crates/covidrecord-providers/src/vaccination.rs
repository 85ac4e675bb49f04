//! COVID-19 vaccination events and how they are found in FHIR resources.
//!
//! # Overview
//!
//! A resource type that can contain vaccinations implements
//! [`VaccinationSource`]. Extraction walks the bundle entries in order and
//! keeps every coding whose code is in the [`VACCINE_CODES`] registry; an
//! item that matches but carries no usable date fails the whole batch.

use covidrecord_core::FhirDateTime;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::bundle::{Bundle, Coding};

/// A single vaccination event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vaccination {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub code: String,
    pub display: String,
    pub location: Option<String>,
    pub lot: Option<String>,
}

/// An entry in the vaccine code registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaccineCode {
    pub code: &'static str,
    pub system: &'static str,
    pub description: &'static str,
}

const CPT: &str = "http://www.ama-assn.org/go/cpt";
const CVX: &str = "http://hl7.org/fhir/sid/cvx";

/// Product and administration codes that identify a COVID-19 vaccination.
///
/// Claims carry CPT codes in `productOrService`; immunization records carry
/// CVX product codes in `vaccineCode`.
pub static VACCINE_CODES: &[VaccineCode] = &[
    VaccineCode {
        code: "91300",
        system: CPT,
        description: "Pfizer-BioNTech COVID-19 vaccine",
    },
    VaccineCode {
        code: "0001A",
        system: CPT,
        description: "Pfizer-BioNTech COVID-19 vaccine administration, first dose",
    },
    VaccineCode {
        code: "0002A",
        system: CPT,
        description: "Pfizer-BioNTech COVID-19 vaccine administration, second dose",
    },
    VaccineCode {
        code: "91301",
        system: CPT,
        description: "Moderna COVID-19 vaccine",
    },
    VaccineCode {
        code: "0011A",
        system: CPT,
        description: "Moderna COVID-19 vaccine administration, first dose",
    },
    VaccineCode {
        code: "0012A",
        system: CPT,
        description: "Moderna COVID-19 vaccine administration, second dose",
    },
    VaccineCode {
        code: "91302",
        system: CPT,
        description: "AstraZeneca COVID-19 vaccine",
    },
    VaccineCode {
        code: "0021A",
        system: CPT,
        description: "AstraZeneca COVID-19 vaccine administration, first dose",
    },
    VaccineCode {
        code: "0022A",
        system: CPT,
        description: "AstraZeneca COVID-19 vaccine administration, second dose",
    },
    VaccineCode {
        code: "208",
        system: CVX,
        description: "Pfizer-BioNTech COVID-19 vaccine",
    },
    VaccineCode {
        code: "207",
        system: CVX,
        description: "Moderna COVID-19 vaccine",
    },
    VaccineCode {
        code: "210",
        system: CVX,
        description: "AstraZeneca COVID-19 vaccine",
    },
];

/// Looks up a code in the registry. Matching ignores the coding system.
#[must_use]
pub fn lookup_vaccine_code(code: &str) -> Option<&'static VaccineCode> {
    VACCINE_CODES.iter().find(|entry| entry.code == code)
}

/// Returns `true` if `code` identifies a COVID-19 vaccination.
#[must_use]
pub fn is_vaccine_code(code: &str) -> bool {
    lookup_vaccine_code(code).is_some()
}

/// A matched item could not be turned into a [`Vaccination`].
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Vaccination {code} has no date")]
    MissingDate { code: String },

    #[error("Vaccination {code} has an invalid date '{value}': {message}")]
    InvalidDate {
        code: String,
        value: String,
        message: String,
    },
}

/// A FHIR resource that may record vaccinations.
pub trait VaccinationSource {
    /// Returns the vaccinations recorded in this resource, in document order.
    ///
    /// # Errors
    ///
    /// Fails on the first matched coding whose date is missing or invalid.
    fn vaccinations(&self) -> Result<Vec<Vaccination>, ExtractError>;
}

/// Extracts vaccinations from every entry of `bundle`, preserving order.
///
/// # Errors
///
/// Returns the first [`ExtractError`]; no partial result is produced.
pub fn extract_vaccinations<R: VaccinationSource>(
    bundle: &Bundle<R>,
) -> Result<Vec<Vaccination>, ExtractError> {
    let mut vaccinations = Vec::new();
    for resource in bundle.resources() {
        vaccinations.extend(resource.vaccinations()?);
    }
    Ok(vaccinations)
}

/// Parses an RFC 3339 timestamp for a matched coding.
pub(crate) fn parse_event_date(
    coding: &Coding,
    value: Option<&str>,
) -> Result<OffsetDateTime, ExtractError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExtractError::MissingDate {
            code: coding.code.clone(),
        })?;

    value
        .parse::<FhirDateTime>()
        .map(FhirDateTime::into_inner)
        .map_err(|e| ExtractError::InvalidDate {
            code: coding.code.clone(),
            value: value.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_registry_contents() {
        for code in [
            "91300", "0001A", "0002A", "91301", "0011A", "0012A", "91302", "0021A", "0022A",
        ] {
            assert!(is_vaccine_code(code), "{code} should be registered");
        }
        assert!(is_vaccine_code("208"));
        assert!(!is_vaccine_code("99213"));
        assert!(!is_vaccine_code(""));
        assert_eq!(lookup_vaccine_code("207").unwrap().system, CVX);
    }

    #[test]
    fn test_parse_event_date() {
        let coding = Coding {
            code: "91300".to_string(),
            ..Coding::default()
        };
        assert_eq!(
            parse_event_date(&coding, Some("2021-02-01T16:00:00.000+00:00")).unwrap(),
            datetime!(2021-02-01 16:00 UTC)
        );
        assert!(matches!(
            parse_event_date(&coding, None),
            Err(ExtractError::MissingDate { .. })
        ));
        assert!(matches!(
            parse_event_date(&coding, Some("2021-02-01")),
            Err(ExtractError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_vaccination_serializes_rfc3339() {
        let vaccination = Vaccination {
            date: datetime!(2021-02-01 16:00 UTC),
            code: "91300".to_string(),
            display: "Pfizer".to_string(),
            location: None,
            lot: Some("EL9261".to_string()),
        };
        let json = serde_json::to_value(&vaccination).unwrap();
        assert_eq!(json["date"], "2021-02-01T16:00:00Z");
        assert_eq!(json["lot"], "EL9261");
    }
}
