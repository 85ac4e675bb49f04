//! CMS Blue Button 2.0 adapter.
//!
//! Blue Button serves Medicare claims. Vaccinations are not recorded as
//! immunizations but as billed items on `ExplanationOfBenefit` resources,
//! identified by their CPT code in `item.productOrService`.
//!
//! Endpoints, relative to the configured bases:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | authorize | `GET {auth}/v1/o/authorize/` |
//! | token | `POST {auth}/v1/o/token/` |
//! | userinfo | `GET {fhir}/v1/connect/userinfo` |
//! | patient | `GET {fhir}/v1/fhir/Patient/{id}` |
//! | claims | `GET {fhir}/v1/fhir/ExplanationOfBenefit?patient={id}` |

use async_trait::async_trait;
use covidrecord_core::FhirDate;
use serde::{Deserialize, Serialize};

use crate::bundle::{Address, Bundle, CodeableConcept, HumanName, Meta};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::fetcher::{BasicCredentials, FhirFetcher};
use crate::paginator::BundlePaginator;
use crate::provider::{
    AuthorizationRequest, HealthProvider, Identity, Patient, ProviderId, require_patient_id,
};
use crate::state::AuthorizationState;
use crate::token::Token;
use crate::vaccination::{
    ExtractError, Vaccination, VaccinationSource, is_vaccine_code, parse_event_date,
};

/// The `/v1/connect/userinfo` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub sub: String,
    // The service spells it with one "r".
    #[serde(default, rename = "prefered_username", alias = "preferred_username")]
    pub preferred_username: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub created: String,
    /// FHIR id of the beneficiary's `Patient`.
    #[serde(default, rename = "patient")]
    pub fhir_id: String,
}

impl From<UserInfo> for Identity {
    fn from(info: UserInfo) -> Self {
        fn non_empty(value: String) -> Option<String> {
            (!value.is_empty()).then_some(value)
        }

        Self {
            subject: non_empty(info.sub),
            preferred_username: non_empty(info.preferred_username),
            name: non_empty(info.name),
            given_name: non_empty(info.given_name),
            family_name: non_empty(info.family_name),
            email: non_empty(info.email),
            created: non_empty(info.created),
            patient_id: non_empty(info.fhir_id),
        }
    }
}

/// A beneficiary `Patient` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub name: Vec<HumanName>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<FhirDate>,
    #[serde(default)]
    pub address: Vec<Address>,
}

impl PatientResource {
    /// Beneficiary records may omit `name`; the projection then carries
    /// empty name fields.
    fn into_patient(self, requested_id: &str) -> Patient {
        let name = self.name.into_iter().next().unwrap_or_default();

        let display_name = match name.joined() {
            joined if joined.is_empty() => name.text.clone().unwrap_or_default(),
            joined => joined,
        };

        Patient {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            display_name,
            given: name.given,
            family: name.family,
            gender: self.gender,
            birth_date: self.birth_date,
            postal_code: self.address.into_iter().find_map(|a| a.postal_code),
        }
    }
}

/// A claim line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EobItem {
    #[serde(default)]
    pub serviced_date: Option<String>,
    #[serde(default, alias = "ProductOrService")]
    pub product_or_service: CodeableConcept,
    #[serde(default)]
    pub service: Option<CodeableConcept>,
}

/// An `ExplanationOfBenefit` claim resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationOfBenefit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub claim_type: Option<CodeableConcept>,
    #[serde(default)]
    pub item: Vec<EobItem>,
}

impl VaccinationSource for ExplanationOfBenefit {
    fn vaccinations(&self) -> Result<Vec<Vaccination>, ExtractError> {
        let mut found = Vec::new();
        for item in &self.item {
            for coding in &item.product_or_service.coding {
                if !is_vaccine_code(&coding.code) {
                    continue;
                }
                found.push(Vaccination {
                    date: parse_event_date(coding, item.serviced_date.as_deref())?,
                    code: coding.code.clone(),
                    display: coding.display.clone(),
                    location: None,
                    lot: None,
                });
            }
        }
        Ok(found)
    }
}

/// Blue Button client.
#[derive(Debug)]
pub struct BlueButtonProvider {
    config: ProviderConfig,
    fetcher: FhirFetcher,
}

impl BlueButtonProvider {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is incomplete.
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        config.validate()?;
        let fetcher = FhirFetcher::new(config.request_timeout)?;
        tracing::info!(client = %config, "Blue Button client configured");
        Ok(Self { config, fetcher })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl HealthProvider for BlueButtonProvider {
    fn id(&self) -> ProviderId {
        ProviderId::BlueButton
    }

    fn authorization_url(&self, _scope: Option<&str>) -> ProviderResult<AuthorizationRequest> {
        let state = AuthorizationState::generate();
        let mut url = self.config.auth_endpoint(&["v1", "o", "authorize", ""])?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.callback_url.as_str())
            .append_pair("response_type", "code")
            .append_pair("state", state.as_str());

        Ok(AuthorizationRequest { url, state })
    }

    async fn exchange_token(&self, code: &str, _state: Option<&str>) -> ProviderResult<Token> {
        if code.is_empty() {
            return Err(ProviderError::invalid_argument("authorization code is empty"));
        }

        let url = self.config.auth_endpoint(&["v1", "o", "token", ""])?;
        let form = [
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.callback_url.as_str()),
        ];

        self.fetcher
            .post_form(
                url.as_str(),
                &form,
                BasicCredentials {
                    username: &self.config.client_id,
                    password: &self.config.client_secret,
                },
            )
            .await
    }

    async fn fetch_identity(&self, token: &Token) -> ProviderResult<Identity> {
        let url = self.config.fhir_endpoint(&["v1", "connect", "userinfo"])?;
        let info: UserInfo = self.fetcher.get_json(url.as_str(), &token.access_token).await?;
        Ok(info.into())
    }

    async fn fetch_patient(&self, token: &Token, patient_id: &str) -> ProviderResult<Patient> {
        let patient_id = require_patient_id(patient_id)?;
        let url = self
            .config
            .fhir_endpoint(&["v1", "fhir", "Patient", patient_id])?;
        let resource: PatientResource =
            self.fetcher.get_json(url.as_str(), &token.access_token).await?;
        Ok(resource.into_patient(patient_id))
    }

    async fn fetch_vaccinations(
        &self,
        token: &Token,
        patient_id: &str,
    ) -> ProviderResult<Vec<Vaccination>> {
        let patient_id = require_patient_id(patient_id)?;
        let mut url = self
            .config
            .fhir_endpoint(&["v1", "fhir", "ExplanationOfBenefit"])?;
        url.query_pairs_mut().append_pair("patient", patient_id);

        let first: Bundle<ExplanationOfBenefit> =
            self.fetcher.get_json(url.as_str(), &token.access_token).await?;

        BundlePaginator::new(&self.fetcher, &token.access_token, self.config.max_pages)
            .collect(url.as_str(), first)
            .await
    }

    fn patient_reference(&self, identity: &Identity, _token: &Token) -> Option<String> {
        identity.patient_id.clone().filter(|id| !id.is_empty())
    }
}
