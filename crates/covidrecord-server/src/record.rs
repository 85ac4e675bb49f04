//! The vaccination record shown to the user, and its synthetic demo variant.

use covidrecord_core::FhirDate;
use covidrecord_providers::{Patient, Vaccination};
use serde::Serialize;
use time::macros::{date, datetime};
use time::{Duration, OffsetDateTime};

/// Doses in a complete course.
pub const COURSE_DOSES: usize = 2;

/// Upper bound on synthetic doses; larger requests are clamped.
pub const MAX_DEMO_DOSES: usize = 10;

const DEMO_FIRST_DOSE: OffsetDateTime = datetime!(2021-02-01 16:00 UTC);
const DEMO_DOSE_INTERVAL: Duration = Duration::days(28);

#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub name: String,
    pub birth_date: Option<FhirDate>,
    pub vaccinations: Vec<Vaccination>,
    pub doses_remaining: usize,
    pub vaccination_complete: bool,
}

impl RecordView {
    pub fn new(patient: &Patient, vaccinations: Vec<Vaccination>) -> Self {
        let doses = vaccinations.len();
        Self {
            name: patient.display_name.clone(),
            birth_date: patient.birth_date,
            vaccinations,
            doses_remaining: COURSE_DOSES.saturating_sub(doses),
            vaccination_complete: doses >= COURSE_DOSES,
        }
    }
}

/// Builds `count` synthetic doses, four weeks apart, at most
/// [`MAX_DEMO_DOSES`].
pub fn demo_vaccinations(count: usize) -> Vec<Vaccination> {
    (0..count.min(MAX_DEMO_DOSES))
        .map_while(|i| {
            let offset = i32::try_from(i)
                .ok()
                .and_then(|n| DEMO_DOSE_INTERVAL.checked_mul(n))?;
            let date = DEMO_FIRST_DOSE.checked_add(offset)?;
            Some(Vaccination {
                date,
                code: "91300-0001A".to_string(),
                display: format!("COVID-19 Vaccination dose {}", i + 1),
                location: Some("Northshore Clinic - Skokie".to_string()),
                lot: Some("1S892X78-B".to_string()),
            })
        })
        .collect()
}

/// The patient shown by the demo record page.
pub fn demo_patient() -> Patient {
    Patient {
        id: "demo".to_string(),
        display_name: "Joseph Esposito".to_string(),
        given: vec!["Joseph".to_string()],
        family: Some("Esposito".to_string()),
        gender: None,
        birth_date: Some(FhirDate::new(date!(1999 - 06 - 01))),
        postal_code: None,
    }
}
