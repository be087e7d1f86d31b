//! Token acquisition errors.

/// Result type alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a token could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token endpoint could not be reached or timed out.
    #[error("Token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered 2xx with a body that is not a token response.
    #[error("Unreadable token response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The identity platform refused the grant.
    #[error("Token endpoint rejected the request: {code} ({description})")]
    Rejected {
        /// `OAuth2` error code, e.g. `invalid_client`.
        code: String,
        /// `error_description`, often carrying an `AADSTS` code.
        description: String,
    },

    /// The endpoint answered with something that is neither a token nor an
    /// `OAuth2` error document.
    #[error("Unexpected token response: {0}")]
    UnexpectedResponse(String),

    /// Client or provider settings are unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A token URL could not be parsed.
    #[error("Invalid token URL: {0}")]
    Url(#[from] url::ParseError),
}
