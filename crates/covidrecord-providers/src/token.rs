//! OAuth token response.

use serde::{Deserialize, Serialize};

/// Token returned by a provider's token endpoint.
///
/// Created once per callback and used immediately; it is never persisted
/// or refreshed.
///
/// ```json
/// {
///   "access_token": "SlAV32hkKG",
///   "expires_in": 3600,
///   "refresh_token": "8xLOxBtZp8",
///   "scope": "openid profile email offline_access",
///   "patient": "1558538470",
///   "state": "af0ifjsldkj",
///   "token_type": "Bearer"
/// }
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The bearer token for resource requests.
    pub access_token: String,

    /// The token type (usually "Bearer").
    #[serde(default)]
    pub token_type: String,

    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: String,

    /// Lifetime in seconds. Some providers send a float.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<f64>,

    /// Refresh token, unused by this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// State echoed back by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Patient launch context (Lighthouse).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
}

impl Token {
    /// Creates a bearer token with no optional fields.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            scope: String::new(),
            expires_in: None,
            refresh_token: None,
            state: None,
            patient: None,
        }
    }

    /// Sets the patient launch context.
    #[must_use]
    pub fn with_patient(mut self, patient: impl Into<String>) -> Self {
        self.patient = Some(patient.into());
        self
    }

    /// Returns the patient launch context if present and non-empty.
    #[must_use]
    pub fn patient_id(&self) -> Option<&str> {
        self.patient.as_deref().filter(|p| !p.is_empty())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("state", &self.state)
            .field("patient", &self.patient)
            .finish()
    }
}
