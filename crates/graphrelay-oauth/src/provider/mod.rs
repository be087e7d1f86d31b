//! Token endpoints.

use crate::error::{Error, Result};
use url::Url;

/// Scope requesting every application permission granted to the app on
/// Microsoft Graph.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Public-cloud Microsoft identity platform host.
pub const MICROSOFT_LOGIN_URL: &str = "https://login.microsoftonline.com";

/// Token endpoint plus the scopes requested when the caller names none.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes sent when the flow has no override.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Any http(s) token endpoint, with no default scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not http(s).
    pub fn custom(token_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            token_url: parse_token_url(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// The v2.0 endpoint of a single Entra ID tenant,
    /// `https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token`,
    /// defaulting to [`GRAPH_DEFAULT_SCOPE`].
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant id is empty or not a single path
    /// segment.
    pub fn microsoft(tenant_id: &str) -> Result<Self> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() || tenant_id.contains(['/', '?', '#']) {
            return Err(Error::InvalidConfig(format!("invalid tenant id: {tenant_id:?}")));
        }

        let mut provider =
            Self::custom(format!("{MICROSOFT_LOGIN_URL}/{tenant_id}/oauth2/v2.0/token"))?;
        provider.default_scopes = vec![GRAPH_DEFAULT_SCOPE.to_string()];
        Ok(provider)
    }

    /// Points at another endpoint, e.g. a sovereign cloud or a local test
    /// server, keeping the default scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not http(s).
    pub fn with_token_url(mut self, token_url: impl AsRef<str>) -> Result<Self> {
        self.token_url = parse_token_url(token_url.as_ref())?;
        Ok(self)
    }
}

fn parse_token_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidConfig(format!(
            "unsupported token URL scheme: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_microsoft_tenant_endpoint() {
        let provider = Provider::microsoft(" contoso.onmicrosoft.com ").unwrap();
        assert_eq!(
            provider.token_url.as_str(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
        assert_eq!(provider.default_scopes, vec![GRAPH_DEFAULT_SCOPE]);
    }

    #[test]
    fn test_microsoft_rejects_bad_tenant() {
        for tenant in ["", "  ", "a/b", "t?x=1"] {
            assert!(matches!(
                Provider::microsoft(tenant),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_token_url_override_keeps_scopes() {
        let provider = Provider::microsoft("tenant")
            .unwrap()
            .with_token_url("http://127.0.0.1:9000/token")
            .unwrap();
        assert_eq!(provider.token_url.as_str(), "http://127.0.0.1:9000/token");
        assert_eq!(provider.default_scopes, vec![GRAPH_DEFAULT_SCOPE]);
    }

    #[test]
    fn test_token_url_must_be_http() {
        assert!(matches!(
            Provider::microsoft("tenant").unwrap().with_token_url("file:///etc/token"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(Provider::custom("not a url"), Err(Error::Url(_))));
    }

    #[test]
    fn test_custom_provider_has_no_default_scopes() {
        let provider = Provider::custom("https://auth.example.com/token").unwrap();
        assert!(provider.default_scopes.is_empty());
    }
}
