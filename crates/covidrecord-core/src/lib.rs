//! FHIR primitive date types shared by the covidrecord crates.

pub mod error;
pub mod time;

pub use error::{CoreError, Result};
pub use time::{FhirDate, FhirDateTime};
