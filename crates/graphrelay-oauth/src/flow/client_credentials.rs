//! Client Credentials Flow implementation (RFC 6749 section 4.4).

use super::OAuthClient;
use crate::error::{Error, Result};
use crate::token::Token;

/// Client Credentials Flow for `OAuth2`.
///
/// Used by daemons acting under their own application identity rather than
/// on behalf of a user. No refresh token is issued; callers request a new
/// token when needed.
#[derive(Debug, Clone)]
pub struct ClientCredentialsFlow {
    client: OAuthClient,
    scopes: Option<Vec<String>>,
}

impl ClientCredentialsFlow {
    /// Creates a new client credentials flow.
    #[must_use]
    pub const fn new(client: OAuthClient) -> Self {
        Self {
            client,
            scopes: None,
        }
    }

    /// Overrides the provider's default scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Returns the scope string sent to the token endpoint.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes
            .as_ref()
            .unwrap_or(&self.client.provider.default_scopes)
            .join(" ")
    }

    /// Requests an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has no secret, the request fails, or
    /// the server answers with an OAuth error.
    pub async fn fetch_token(&self) -> Result<Token> {
        let secret = self
            .client
            .client_secret
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("client secret is required".into()))?;

        let scope = self.scope();
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", secret),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        self.client.request_token(&params).await
    }
}
