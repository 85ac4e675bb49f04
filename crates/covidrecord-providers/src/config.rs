//! Provider configuration.
//!
//! A [`ProviderConfig`] holds the client credentials and base URLs of one
//! registered OAuth client. It is immutable once built and shared read-only
//! by every operation of an adapter.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound on bundle pages read in one traversal.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Configuration of one provider client registration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth client identifier.
    pub client_id: String,

    /// OAuth client secret, sent through HTTP Basic auth on token exchange.
    pub client_secret: String,

    /// Base URL of the authorization and token endpoints.
    pub auth_base_url: Url,

    /// Base URL of the FHIR resource endpoints.
    pub fhir_base_url: Url,

    /// Registered redirect URI.
    pub callback_url: Url,

    /// Default OAuth scopes requested when the caller does not pass one.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Per-request deadline.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum number of bundle pages read while collecting vaccinations.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

impl ProviderConfig {
    /// Creates a configuration with the default timeout and page limit.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_base_url: Url,
        fhir_base_url: Url,
        callback_url: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_base_url,
            fhir_base_url,
            callback_url,
            scopes: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the bundle page limit.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Checks that identifiers are present and limits are usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first offending field.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(ProviderError::invalid_argument("client_id must not be empty"));
        }
        if self.client_secret.is_empty() {
            return Err(ProviderError::invalid_argument(
                "client_secret must not be empty",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ProviderError::invalid_argument(
                "request_timeout must be > 0",
            ));
        }
        if self.max_pages == 0 {
            return Err(ProviderError::invalid_argument("max_pages must be > 0"));
        }
        for (name, url) in [
            ("auth_base_url", &self.auth_base_url),
            ("fhir_base_url", &self.fhir_base_url),
        ] {
            if url.cannot_be_a_base() {
                return Err(ProviderError::invalid_argument(format!(
                    "{name} cannot be used as a base URL: {url}"
                )));
            }
        }
        Ok(())
    }

    /// Returns `{auth_base_url}/{segments...}` with each segment percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the base URL cannot carry a path.
    pub fn auth_endpoint(&self, segments: &[&str]) -> ProviderResult<Url> {
        append_segments(&self.auth_base_url, segments)
    }

    /// Returns `{fhir_base_url}/{segments...}` with each segment percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the base URL cannot carry a path.
    pub fn fhir_endpoint(&self, segments: &[&str]) -> ProviderResult<Url> {
        append_segments(&self.fhir_base_url, segments)
    }

    fn redacted_secret(&self) -> String {
        match self.client_secret.get(..5) {
            Some(prefix) if self.client_secret.len() > 5 => format!("{prefix}..."),
            _ => "<empty>".to_string(),
        }
    }
}

fn append_segments(base: &Url, segments: &[&str]) -> ProviderResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| {
            ProviderError::invalid_argument(format!("cannot append a path to {base}"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{} {} {} {} {}}}",
            self.client_id,
            self.redacted_secret(),
            self.auth_base_url,
            self.fhir_base_url,
            self.callback_url
        )
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.redacted_secret())
            .field("auth_base_url", &self.auth_base_url.as_str())
            .field("fhir_base_url", &self.fhir_base_url.as_str())
            .field("callback_url", &self.callback_url.as_str())
            .field("scopes", &self.scopes)
            .field("request_timeout", &self.request_timeout)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}
