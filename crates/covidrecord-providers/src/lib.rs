//! OAuth2 + FHIR retrieval of COVID-19 vaccination records from CMS Blue
//! Button and VA Lighthouse.
//!
//! # Overview
//!
//! Each provider is an implementation of [`HealthProvider`]:
//!
//! - [`BlueButtonProvider`] reads Medicare claims (`ExplanationOfBenefit`).
//! - [`LighthouseProvider`] reads VA `Immunization` records.
//!
//! A session runs in four steps: build an [`AuthorizationRequest`] and
//! record its state in a [`StateStore`]; on callback, verify the state and
//! exchange the code for a [`Token`]; locate the patient; read the
//! [`Patient`] and the [`Vaccination`] list. Calls within a session are
//! sequential and each has its own deadline.
//!
//! # Example
//!
//! ```no_run
//! use covidrecord_providers::{
//!     BlueButtonProvider, HealthProvider, InMemoryStateStore, ProviderConfig, StateStore,
//! };
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let base = Url::parse("https://sandbox.bluebutton.cms.gov")?;
//! let provider = BlueButtonProvider::new(ProviderConfig::new(
//!     "client-id",
//!     "client-secret",
//!     base.clone(),
//!     base,
//!     Url::parse("http://localhost:6655/bbcallback")?,
//! ))?;
//!
//! let store = InMemoryStateStore::default();
//! let request = provider.authorization_url(None)?;
//! store.issue(&request.state, provider.id()).await;
//! println!("redirect the user to {}", request.url);
//! # Ok(())
//! # }
//! ```

pub mod bluebutton;
pub mod bundle;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod lighthouse;
pub mod paginator;
pub mod provider;
pub mod state;
pub mod token;
pub mod vaccination;

pub use bluebutton::BlueButtonProvider;
pub use bundle::{Bundle, BundleEntry, BundleLink, CodeableConcept, Coding};
pub use config::ProviderConfig;
pub use error::{ProviderError, ProviderResult};
pub use fetcher::FhirFetcher;
pub use lighthouse::LighthouseProvider;
pub use paginator::BundlePaginator;
pub use provider::{AuthorizationRequest, HealthProvider, Identity, Patient, ProviderId};
pub use state::{AuthorizationState, InMemoryStateStore, StateStore, verify_callback_state};
pub use token::Token;
pub use vaccination::{
    ExtractError, VACCINE_CODES, Vaccination, VaccinationSource, VaccineCode,
    extract_vaccinations, is_vaccine_code,
};
