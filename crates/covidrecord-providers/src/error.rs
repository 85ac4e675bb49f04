//! Error types for provider operations.
//!
//! Every operation of the provider layer returns the first error it hits.
//! Variants carry the URL that was attempted and the upstream status or
//! decode failure so callers can log and diagnose without re-running the
//! request.

use crate::vaccination::ExtractError;

/// Errors that can occur while talking to a health data provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a status other than 200.
    #[error("Provider returned {status} for {url}")]
    Auth {
        /// The URL that was requested.
        url: String,
        /// The HTTP status line, e.g. `401 Unauthorized`.
        status: String,
        /// The numeric status code.
        code: u16,
    },

    /// No response arrived before the request deadline.
    #[error("Request to {url} timed out")]
    Timeout {
        /// The URL that was requested.
        url: String,
    },

    /// The response body did not match the expected JSON shape.
    #[error("Failed to decode response from {url}: {message}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decode failure.
        message: String,
    },

    /// A required identifier was missing before a request was issued.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A transport failure other than a timeout (DNS, TLS, connection reset).
    #[error("Network error for {url}: {message}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// The underlying transport failure.
        message: String,
    },

    /// A configured or provider-supplied URL could not be parsed.
    #[error("URL error: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The callback state was unknown, expired, reused, or issued for
    /// another provider.
    #[error("Authorization state mismatch")]
    StateMismatch,

    /// A bundle `next` link pointed at a page already visited.
    #[error("Pagination loop detected at {url}")]
    PaginationLoop {
        /// The repeated page URL.
        url: String,
    },

    /// More pages were linked than the configured maximum.
    #[error("Pagination exceeded the limit of {limit} pages")]
    PageLimitExceeded {
        /// The configured page limit.
        limit: usize,
    },

    /// A matched clinical item could not be turned into a vaccination.
    #[error("Vaccination extraction failed: {0}")]
    Extraction(#[from] ExtractError),
}

impl ProviderError {
    /// Creates an `Auth` error from a response status.
    #[must_use]
    pub fn auth(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        Self::Auth {
            url: url.into(),
            status: status.to_string(),
            code: status.as_u16(),
        }
    }

    /// Creates a `Decode` error.
    #[must_use]
    pub fn decode(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classifies a transport error from reqwest.
    #[must_use]
    pub fn from_transport(url: impl Into<String>, err: &reqwest::Error) -> Self {
        let url = url.into();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_decode() {
            Self::Decode {
                url,
                message: err.to_string(),
            }
        } else {
            Self::Network {
                url,
                message: err.to_string(),
            }
        }
    }

    /// Returns `true` if the provider rejected the request with a non-200 status.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns `true` if the request deadline expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if a payload or a date inside it was malformed.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Extraction(_))
    }

    /// Returns `true` if the caller supplied a missing or empty identifier.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns `true` if the error was caused by the inbound request rather
    /// than by the provider.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::StateMismatch)
    }

    /// Returns the upstream HTTP status code, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Auth { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Type alias for provider results.
pub type ProviderResult<T> = Result<T, ProviderError>;
