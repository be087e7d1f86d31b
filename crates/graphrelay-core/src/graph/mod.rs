//! Delivery through the Microsoft Graph `sendMail` API.
//!
//! Every send fetches a fresh client-credentials token and posts the
//! message to `users/{sender}/sendMail`. Only `202 Accepted` counts as
//! success. Rejections are classified once, here, as transient
//! (`MailboxInfoStale`) or permanent; [`RetryPolicy`] retries only the
//! transient ones.

mod retry;
mod types;

pub use retry::RetryPolicy;
pub use types::{
    BodyType, EmailAddress, FILE_ATTACHMENT_TYPE, FileAttachment, GraphMessage, ItemBody,
    Recipient, SendMailRequest,
};

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use graphrelay_oauth::{ClientCredentialsFlow, OAuthClient, Provider};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Graph v1.0 endpoint.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Timeout applied to every Graph request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Graph error code that marks a rejection as retryable.
const MAILBOX_INFO_STALE: &str = "MailboxInfoStale";

/// Why a send attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Token acquisition failed.
    #[error("Failed to get access token: {0}")]
    Auth(#[from] graphrelay_oauth::Error),

    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Graph answered with something other than 202.
    #[error("Graph API error (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
        /// Whether the failure is worth retrying.
        transient: bool,
    },

    /// Every attempt failed with a transient error.
    #[error("Failed after {attempts} attempts. Last error: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Builds a rejection. It is transient when the Graph error code or
    /// any other part of the body mentions `MailboxInfoStale`.
    #[must_use]
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let code = serde_json::from_str::<types::ErrorResponse>(&body)
            .map(|response| response.error.code)
            .unwrap_or_default();
        let transient = code.contains(MAILBOX_INFO_STALE) || body.contains(MAILBOX_INFO_STALE);
        if !code.is_empty() {
            debug!(status, %code, transient, "Graph rejected request");
        }
        Self::Rejected {
            status,
            body,
            transient,
        }
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected { transient: true, .. })
    }

    /// Returns true if Graph refused the message outright.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { transient: false, .. })
    }
}

/// Sink for outbound messages.
pub trait MailSender: Send + Sync + 'static {
    /// Sends one message as `mailbox`, making a single attempt.
    fn send_mail(
        &self,
        mailbox: &str,
        request: &SendMailRequest,
    ) -> impl Future<Output = std::result::Result<(), DeliveryError>> + Send;
}

/// Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    flow: ClientCredentialsFlow,
    http: reqwest::Client,
    base_url: Url,
}

impl GraphClient {
    /// Creates a client around a token flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(flow: ClientCredentialsFlow) -> Result<Self> {
        Self::with_http(flow, http_client()?)
    }

    /// Creates a client for the configured tenant and application. Token
    /// and `sendMail` requests share one HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant id cannot form a token URL.
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        let http = http_client()?;
        let provider = Provider::microsoft(&config.tenant_id)?;
        let client = OAuthClient::with_http_client(&config.client_id, provider, http.clone())
            .with_client_secret(&config.client_secret);
        let flow = ClientCredentialsFlow::new(client).with_scopes(vec![config.scope.clone()]);
        Self::with_http(flow, http)
    }

    fn with_http(flow: ClientCredentialsFlow, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(GRAPH_BASE_URL)
            .map_err(|e| Error::Config(format!("Invalid Graph URL: {e}")))?;
        Ok(Self {
            flow,
            http,
            base_url,
        })
    }

    /// Points the client at another Graph root.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url).map_err(|e| Error::Config(format!("Invalid Graph URL: {e}")))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!("Invalid Graph URL: {base_url}")));
        }
        self.base_url = url;
        Ok(self)
    }

    /// Returns the `sendMail` URL for a mailbox.
    #[must_use]
    pub fn send_mail_url(&self, mailbox: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", mailbox, "sendMail"]);
        }
        url
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))
}

impl MailSender for GraphClient {
    async fn send_mail(
        &self,
        mailbox: &str,
        request: &SendMailRequest,
    ) -> std::result::Result<(), DeliveryError> {
        let token = self.flow.fetch_token().await?;
        let url = self.send_mail_url(mailbox);
        debug!(%url, attachments = request.message.attachments.len(), "Posting message to Graph");

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, token.authorization_header())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::rejected(status.as_u16(), body))
    }
}
