//! VA Lighthouse adapter.
//!
//! Lighthouse is a SMART-on-FHIR server: the token carries the patient
//! launch context, and vaccinations are `Immunization` resources coded
//! with CVX in `vaccineCode`.
//!
//! Endpoints, relative to the configured bases:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | authorize | `GET {auth}/oauth2/authorization` |
//! | token | `POST {auth}/oauth2/token/` |
//! | patient | `GET {fhir}/Patient/{id}` |
//! | immunizations | `GET {fhir}/Immunization?patient={id}` |

use async_trait::async_trait;
use covidrecord_core::FhirDate;
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, CodeableConcept, HumanName, Reference};
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

/// Scopes requested when neither the caller nor the configuration names any.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "launch/patient",
    "patient/Patient.read",
    "patient/Immunization.read",
];

/// A veteran `Patient` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Vec<HumanName>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<FhirDate>,
}

impl PatientResource {
    fn into_patient(self, url: &str, requested_id: &str) -> ProviderResult<Patient> {
        let name = self
            .name
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::decode(url, "patient has no name"))?;

        let display_name = match name.text.as_deref() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => name.joined(),
        };

        Ok(Patient {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            display_name,
            given: name.given,
            family: name.family,
            gender: self.gender,
            birth_date: self.birth_date,
            postal_code: None,
        })
    }
}

/// An `Immunization` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Immunization {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub vaccine_code: CodeableConcept,
    #[serde(default)]
    pub patient: Option<Reference>,
    #[serde(default)]
    pub occurrence_date_time: Option<String>,
    #[serde(default)]
    pub occurrence_string: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub location: Option<Reference>,
}

impl VaccinationSource for Immunization {
    fn vaccinations(&self) -> Result<Vec<Vaccination>, ExtractError> {
        let occurrence = self
            .occurrence_date_time
            .as_deref()
            .or(self.occurrence_string.as_deref());

        let mut found = Vec::new();
        for coding in &self.vaccine_code.coding {
            if !is_vaccine_code(&coding.code) {
                continue;
            }
            let display = if coding.display.is_empty() {
                self.vaccine_code.text.clone().unwrap_or_default()
            } else {
                coding.display.clone()
            };
            found.push(Vaccination {
                date: parse_event_date(coding, occurrence)?,
                code: coding.code.clone(),
                display,
                location: self.location.as_ref().and_then(|l| l.display.clone()),
                lot: self.lot_number.clone(),
            });
        }
        Ok(found)
    }
}

/// Lighthouse client.
#[derive(Debug)]
pub struct LighthouseProvider {
    config: ProviderConfig,
    fetcher: FhirFetcher,
}

impl LighthouseProvider {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is incomplete.
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        config.validate()?;
        let fetcher = FhirFetcher::new(config.request_timeout)?;
        tracing::info!(client = %config, "Lighthouse client configured");
        Ok(Self { config, fetcher })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn default_scope(&self) -> String {
        if self.config.scopes.is_empty() {
            DEFAULT_SCOPES.join(" ")
        } else {
            self.config.scopes.join(" ")
        }
    }
}

#[async_trait]
impl HealthProvider for LighthouseProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Lighthouse
    }

    fn authorization_url(&self, scope: Option<&str>) -> ProviderResult<AuthorizationRequest> {
        let state = AuthorizationState::generate();
        let scope = scope.map_or_else(|| self.default_scope(), str::to_string);

        let mut url = self.config.auth_endpoint(&["oauth2", "authorization"])?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.callback_url.as_str())
            .append_pair("response_type", "code")
            .append_pair("state", state.as_str())
            .append_pair("scope", &scope);

        Ok(AuthorizationRequest { url, state })
    }

    async fn exchange_token(&self, code: &str, state: Option<&str>) -> ProviderResult<Token> {
        if code.is_empty() {
            return Err(ProviderError::invalid_argument("authorization code is empty"));
        }
        let state = state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::invalid_argument("state is required"))?;

        let url = self.config.auth_endpoint(&["oauth2", "token", ""])?;
        let form = [
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("state", state),
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
        token
            .patient_id()
            .map(Identity::for_patient)
            .ok_or_else(|| ProviderError::invalid_argument("token carries no patient context"))
    }

    async fn fetch_patient(&self, token: &Token, patient_id: &str) -> ProviderResult<Patient> {
        let patient_id = require_patient_id(patient_id)?;
        let url = self.config.fhir_endpoint(&["Patient", patient_id])?;
        let resource: PatientResource =
            self.fetcher.get_json(url.as_str(), &token.access_token).await?;
        resource.into_patient(url.as_str(), patient_id)
    }

    async fn fetch_vaccinations(
        &self,
        token: &Token,
        patient_id: &str,
    ) -> ProviderResult<Vec<Vaccination>> {
        let patient_id = require_patient_id(patient_id)?;
        let mut url = self.config.fhir_endpoint(&["Immunization"])?;
        url.query_pairs_mut().append_pair("patient", patient_id);

        let first: Bundle<Immunization> =
            self.fetcher.get_json(url.as_str(), &token.access_token).await?;

        BundlePaginator::new(&self.fetcher, &token.access_token, self.config.max_pages)
            .collect(url.as_str(), first)
            .await
    }

    fn patient_reference(&self, _identity: &Identity, token: &Token) -> Option<String> {
        token.patient_id().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;
    use url::Url;

    fn config() -> ProviderConfig {
        ProviderConfig::new(
            "va-client",
            "va-secret-value",
            Url::parse("https://sandbox-api.va.gov/oauth2/health/v1").unwrap(),
            Url::parse("https://sandbox-api.va.gov/services/fhir/v0/r4").unwrap(),
            Url::parse("http://localhost:6655/callback").unwrap(),
        )
    }

    #[test]
    fn test_authorization_url_default_scope() {
        let provider = LighthouseProvider::new(config()).unwrap();
        let request = provider.authorization_url(None).unwrap();
        assert_eq!(request.url.path(), "/oauth2/health/v1/oauth2/authorization");

        let scope = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(
            scope,
            "openid profile email launch/patient patient/Patient.read patient/Immunization.read"
        );
        let state = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(state, request.state.as_str());
    }

    #[test]
    fn test_authorization_url_explicit_scope() {
        let provider =
            LighthouseProvider::new(config().with_scopes(["openid", "launch/patient"])).unwrap();

        let configured = provider.authorization_url(None).unwrap();
        assert!(configured.url.as_str().contains("scope=openid+launch%2Fpatient"));

        let explicit = provider.authorization_url(Some("openid")).unwrap();
        assert!(explicit.url.as_str().ends_with("scope=openid"));
    }

    #[tokio::test]
    async fn test_identity_from_token() {
        let provider = LighthouseProvider::new(config()).unwrap();
        let token = Token::bearer("t").with_patient("1558538470");

        let identity = provider.fetch_identity(&token).await.unwrap();
        assert_eq!(identity.patient_id.as_deref(), Some("1558538470"));
        assert_eq!(
            provider.patient_reference(&Identity::default(), &token),
            Some("1558538470".to_string())
        );

        let err = provider.fetch_identity(&Token::bearer("t")).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_exchange_requires_state() {
        let provider = LighthouseProvider::new(config()).unwrap();
        let err = provider.exchange_token("code", None).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_patient_name_from_text() {
        let resource: PatientResource = serde_json::from_value(json!({
            "resourceType": "Patient",
            "id": "1558538470",
            "name": [{"use": "usual", "text": "Mr. Lee Prosacco", "family": "Prosacco", "given": ["Lee"]}],
            "birthDate": "1948-10-11"
        }))
        .unwrap();

        let patient = resource.into_patient("u", "1558538470").unwrap();
        assert_eq!(patient.display_name, "Mr. Lee Prosacco");
        assert_eq!(patient.birth_date.unwrap().to_string(), "1948-10-11");
    }

    #[test]
    fn test_patient_without_name_is_decode_error() {
        let resource: PatientResource =
            serde_json::from_value(json!({"resourceType": "Patient", "name": []})).unwrap();
        assert!(resource.into_patient("u", "1").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_immunization_extraction() {
        let immunization: Immunization = serde_json::from_value(json!({
            "resourceType": "Immunization",
            "id": "I2-1",
            "status": "completed",
            "vaccineCode": {
                "coding": [{"system": "http://hl7.org/fhir/sid/cvx", "code": "207", "display": "COVID-19, mRNA, LNP-S, PF, 100 mcg/0.5 mL dose"}],
                "text": "COVID-19 Moderna"
            },
            "occurrenceDateTime": "2021-01-14T09:30:21Z",
            "lotNumber": "011J20A",
            "location": {"display": "Cheyenne VA Medical Center"}
        }))
        .unwrap();

        let found = immunization.vaccinations().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "207");
        assert_eq!(found[0].date, datetime!(2021-01-14 09:30:21 UTC));
        assert_eq!(found[0].lot.as_deref(), Some("011J20A"));
        assert_eq!(found[0].location.as_deref(), Some("Cheyenne VA Medical Center"));
    }

    #[test]
    fn test_non_covid_immunization_is_skipped() {
        let immunization: Immunization = serde_json::from_value(json!({
            "vaccineCode": {"coding": [{"code": "140", "display": "Influenza"}]},
            "occurrenceDateTime": "2020-10-01T09:00:00Z"
        }))
        .unwrap();
        assert!(immunization.vaccinations().unwrap().is_empty());
    }

    #[test]
    fn test_occurrence_string_fallback() {
        let immunization: Immunization = serde_json::from_value(json!({
            "vaccineCode": {"coding": [{"code": "208"}], "text": "COVID-19 Pfizer"},
            "occurrenceString": "2021-02-01T16:00:00Z"
        }))
        .unwrap();
        let found = immunization.vaccinations().unwrap();
        assert_eq!(found[0].display, "COVID-19 Pfizer");
        assert!(found[0].location.is_none());
    }
}
