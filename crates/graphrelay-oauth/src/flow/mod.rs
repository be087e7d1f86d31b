//! Token requests against a [`Provider`].

mod client_credentials;

pub use client_credentials::ClientCredentialsFlow;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};
use reqwest::Client;
use std::time::Duration;

/// Timeout for a token request when the client builds its own HTTP client.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Registered application identity.
#[derive(Clone)]
pub struct OAuthClient {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret; required by [`ClientCredentialsFlow`].
    pub client_secret: Option<String>,
    /// Token endpoint.
    pub provider: Provider,
    http: Client,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Creates a client with its own HTTP client and
    /// [`TOKEN_REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Result<Self> {
        let http = Client::builder().timeout(TOKEN_REQUEST_TIMEOUT).build()?;
        Ok(Self::with_http_client(client_id, provider, http))
    }

    /// Creates a client that reuses `http`, including its timeout.
    #[must_use]
    pub fn with_http_client(client_id: impl Into<String>, provider: Provider, http: Client) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http,
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Posts a grant form and decodes the answer.
    ///
    /// A non-2xx answer becomes [`Error::Rejected`] when the body is an
    /// `OAuth2` error document and [`Error::UnexpectedResponse`] otherwise.
    pub(crate) async fn request_token(&self, form: &[(&str, &str)]) -> Result<Token> {
        let response = self
            .http
            .post(self.provider.token_url.clone())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::UnexpectedResponse(format!("HTTP {status}: {body}")),
                ErrorResponse::into_error,
            ));
        }

        Token::from_response(serde_json::from_str::<TokenResponse>(&body)?)
    }
}
