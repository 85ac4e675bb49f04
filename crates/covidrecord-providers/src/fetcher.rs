//! Authenticated HTTP primitives shared by both providers.
//!
//! [`FhirFetcher`] issues exactly one request per call, bounded by the
//! configured deadline, and classifies failures:
//!
//! - status other than 200 → [`ProviderError::Auth`]
//! - deadline exceeded → [`ProviderError::Timeout`]
//! - body not matching the target shape → [`ProviderError::Decode`]
//!
//! There is no retry; the first failure ends the calling operation.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, ProviderResult};

const FHIR_ACCEPT: &str = "application/fhir+json, application/json";

/// Client credentials sent with HTTP Basic auth.
#[derive(Clone, Copy)]
pub struct BasicCredentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Bearer-authenticated JSON fetcher.
#[derive(Debug, Clone)]
pub struct FhirFetcher {
    http_client: reqwest::Client,
    request_timeout: Duration,
}

impl FhirFetcher {
    /// Creates a fetcher whose requests expire after `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the TLS backend cannot be initialised.
    pub fn new(request_timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Network {
                url: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http_client,
            request_timeout,
        })
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// GETs `url` with `Authorization: Bearer <access_token>` and decodes
    /// the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// `Auth` on a non-200 status, `Timeout` past the deadline, `Decode` if
    /// the body does not match `T`, `Network` for other transport failures.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> ProviderResult<T> {
        tracing::debug!(url, "getting");
        let start = Instant::now();

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, HeaderValue::from_static(FHIR_ACCEPT))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(url, &e))?;

        tracing::debug!(url, elapsed = ?start.elapsed(), status = %response.status(), "request took");

        decode_response(url, response).await
    }

    /// POSTs an `application/x-www-form-urlencoded` body with HTTP Basic
    /// auth and decodes the JSON answer into `T`.
    ///
    /// # Errors
    ///
    /// Same classification as [`FhirFetcher::get_json`].
    pub async fn post_form<F, T>(
        &self,
        url: &str,
        form: &F,
        credentials: BasicCredentials<'_>,
    ) -> ProviderResult<T>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(url, "posting form");
        let start = Instant::now();

        let response = self
            .http_client
            .post(url)
            .basic_auth(credentials.username, Some(credentials.password))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(url, &e))?;

        tracing::debug!(url, elapsed = ?start.elapsed(), status = %response.status(), "request took");

        decode_response(url, response).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> ProviderResult<T> {
    let status = response.status();
    if status != StatusCode::OK {
        tracing::warn!(url, status = %status, "provider rejected request");
        return Err(ProviderError::auth(url, status));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ProviderError::from_transport(url, &e))?;

    serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(url, error = %e, "failed to decode provider response");
        ProviderError::decode(url, e)
    })
}
