//! The provider abstraction shared by Blue Button and Lighthouse.
//!
//! # Overview
//!
//! Both services run the same authorization-code flow and serve FHIR R4
//! resources, but they disagree on paths, on where the patient reference
//! lives and on which resource carries immunizations. [`HealthProvider`]
//! hides those differences behind one async interface:
//!
//! 1. [`HealthProvider::authorization_url`] builds the redirect with a fresh
//!    state.
//! 2. [`HealthProvider::exchange_token`] trades the callback code for a token.
//! 3. [`HealthProvider::fetch_identity`] and [`HealthProvider::patient_reference`]
//!    locate the patient.
//! 4. [`HealthProvider::fetch_patient`] and
//!    [`HealthProvider::fetch_vaccinations`] read the record.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use covidrecord_core::FhirDate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::state::AuthorizationState;
use crate::token::Token;
use crate::vaccination::Vaccination;

/// Identifies a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// CMS Blue Button 2.0 (Medicare claims).
    BlueButton,
    /// VA Lighthouse (veterans' health records).
    Lighthouse,
}

impl ProviderId {
    /// Returns the lower-case name used in routes and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlueButton => "bluebutton",
            Self::Lighthouse => "lighthouse",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bluebutton" => Ok(Self::BlueButton),
            "lighthouse" => Ok(Self::Lighthouse),
            other => Err(ProviderError::invalid_argument(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// An authorization redirect and the state embedded in it.
///
/// The caller must record `state` before redirecting the user.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: AuthorizationState,
}

/// Who the token belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: Option<String>,
    pub preferred_username: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub created: Option<String>,
    /// FHIR id of the patient record.
    pub patient_id: Option<String>,
}

impl Identity {
    /// Creates an identity that only carries a patient reference.
    #[must_use]
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Self::default()
        }
    }
}

/// Demographics common to both providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    /// Name as it should be shown to the user.
    pub display_name: String,
    #[serde(default)]
    pub given: Vec<String>,
    pub family: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<FhirDate>,
    pub postal_code: Option<String>,
}

/// A health data provider reachable through OAuth2 and FHIR.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    /// Which provider this is.
    fn id(&self) -> ProviderId;

    /// Builds an authorization URL carrying a freshly generated state.
    ///
    /// `scope` is only used by providers that request scopes; `None` falls
    /// back to the configured defaults.
    fn authorization_url(&self, scope: Option<&str>) -> ProviderResult<AuthorizationRequest>;

    /// Exchanges an authorization code for a token.
    async fn exchange_token(&self, code: &str, state: Option<&str>) -> ProviderResult<Token>;

    /// Resolves the identity behind `token`.
    async fn fetch_identity(&self, token: &Token) -> ProviderResult<Identity>;

    /// Reads the patient's demographics.
    async fn fetch_patient(&self, token: &Token, patient_id: &str) -> ProviderResult<Patient>;

    /// Reads every COVID-19 vaccination on record, across all bundle pages.
    async fn fetch_vaccinations(
        &self,
        token: &Token,
        patient_id: &str,
    ) -> ProviderResult<Vec<Vaccination>>;

    /// Returns the patient id to read, from wherever this provider puts it.
    fn patient_reference(&self, identity: &Identity, token: &Token) -> Option<String>;
}

/// Fails with `InvalidArgument` when `patient_id` is empty.
pub(crate) fn require_patient_id(patient_id: &str) -> ProviderResult<&str> {
    if patient_id.trim().is_empty() {
        return Err(ProviderError::invalid_argument("patient id is empty"));
    }
    Ok(patient_id)
}
