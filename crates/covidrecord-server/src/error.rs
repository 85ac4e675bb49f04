//! HTTP error responses.
//!
//! Every failure is answered with a FHIR `OperationOutcome` body. Errors
//! caused by the inbound request map to 400, provider failures to 502 and
//! provider timeouts to 504.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use covidrecord_providers::ProviderError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The provider redirected back with an OAuth error instead of a code.
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The provider gave no way to find the patient record.
    #[error("Provider did not identify a patient")]
    MissingPatient,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Provider(err) => provider_status(err),
            Self::AuthorizationDenied(_) => StatusCode::BAD_REQUEST,
            Self::MissingPatient => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn issue_code(&self) -> &'static str {
        match self {
            Self::Provider(ProviderError::Timeout { .. }) => "timeout",
            Self::Provider(ProviderError::StateMismatch) => "security",
            Self::Provider(err) if err.is_client_error() => "invalid",
            Self::AuthorizationDenied(_) => "forbidden",
            Self::NotFound(_) => "not-found",
            _ => "exception",
        }
    }
}

fn provider_status(err: &ProviderError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else if matches!(err, ProviderError::InvalidUrl(_)) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": self.issue_code(),
                "diagnostics": self.to_string()
            }]
        });

        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json"),
        );
        response
    }
}
