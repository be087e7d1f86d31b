//! # graphrelay-oauth
//!
//! `OAuth2` client-credentials authentication for the Microsoft identity
//! platform.
//!
//! ## Features
//!
//! - **Client Credentials Flow**: app-only tokens for daemons and gateways
//! - **Token metadata**: expiry tracking with a safety buffer
//! - **Provider configuration**: tenant-scoped Microsoft endpoint, overridable token URL
//!
//! ## Quick Start
//!
//! ```ignore
//! use graphrelay_oauth::{ClientCredentialsFlow, OAuthClient, Provider};
//!
//! let provider = Provider::microsoft("contoso.onmicrosoft.com")?;
//! let client = OAuthClient::new("client_id", provider)?.with_client_secret("secret");
//! let token = ClientCredentialsFlow::new(client).fetch_token().await?;
//!
//! request.header("Authorization", token.authorization_header());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{ClientCredentialsFlow, OAuthClient};
pub use provider::Provider;
pub use token::Token;
