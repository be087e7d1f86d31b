//! Access tokens issued by the token endpoint.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Seconds before expiry at which a token counts as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Bearer token for Graph requests.
#[derive(Clone)]
pub struct Token {
    /// Opaque token value.
    pub access_token: String,
    /// Scheme for the `Authorization` header, normally `Bearer`.
    pub token_type: String,
    /// Absolute expiry computed from `expires_in` at receipt.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Creates a token without an expiry.
    #[must_use]
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at: None,
        }
    }

    /// Builds a token from a successful endpoint response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedResponse`] if `access_token` is empty.
    pub fn from_response(response: TokenResponse) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(Error::UnexpectedResponse("empty access_token".to_string()));
        }
        let lifetime = response.expires_in.or(response.ext_expires_in);
        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: lifetime.map(|secs| Utc::now() + Duration::seconds(i64::from(secs))),
        })
    }

    /// Sets the expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true once the token is within [`EXPIRY_MARGIN_SECS`] of expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= at)
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful body of a client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Token value.
    pub access_token: String,
    /// Defaults to `Bearer` when omitted.
    #[serde(default = "bearer")]
    pub token_type: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u32>,
    /// Extended lifetime some Entra ID tenants report instead.
    #[serde(default)]
    pub ext_expires_in: Option<u32>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

/// `OAuth2` error document (RFC 6749 section 5.2).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Free-text description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to [`Error::Rejected`].
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::Rejected {
            code: self.error,
            description: self.error_description,
        }
    }
}
