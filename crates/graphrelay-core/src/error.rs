//! Error types for the core library.

use crate::graph::DeliveryError;
use graphrelay_smtp::{Reply, ReplyCode};
use thiserror::Error;

/// Errors that can occur while relaying a transaction.
#[derive(Debug, Error)]
pub enum Error {
    /// A transaction command arrived out of order.
    #[error("Bad sequence of commands: {0}")]
    ProtocolSequence(&'static str),

    /// Reading the DATA stream failed.
    #[error("Failed to read message data: {0}")]
    StreamRead(#[from] std::io::Error),

    /// The message envelope could not be parsed.
    #[error("Failed to parse message: {0}")]
    Parse(#[from] graphrelay_mime::Error),

    /// The message has neither a text nor an HTML body.
    #[error("Message has no text or HTML body")]
    ContentPolicy,

    /// The transaction never received DATA, or its row was reclaimed.
    #[error("Transaction {0} is incomplete")]
    Incomplete(String),

    /// The upstream access token could not be obtained.
    #[error("Authentication failed: {0}")]
    Auth(#[from] graphrelay_oauth::Error),

    /// The Graph API did not accept the message.
    #[error("Delivery failed: {0}")]
    Delivery(DeliveryError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DeliveryError> for Error {
    fn from(error: DeliveryError) -> Self {
        match error {
            DeliveryError::Auth(inner) => Self::Auth(inner),
            other => Self::Delivery(other),
        }
    }
}

impl Error {
    /// Returns true if the client may succeed by retrying later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StreamRead(_) | Self::Auth(_) => true,
            Self::Delivery(error) => !error.is_permanent(),
            _ => false,
        }
    }

    /// Converts the error into the SMTP reply sent to the client.
    #[must_use]
    pub fn to_reply(&self) -> Reply {
        match self {
            Self::ProtocolSequence(message) => {
                Reply::single(ReplyCode::BAD_SEQUENCE, format!("5.5.1 {message}"))
            }
            Self::StreamRead(_) => {
                Reply::single(ReplyCode::LOCAL_ERROR, "4.3.0 Error reading message data")
            }
            Self::Parse(_) => {
                Reply::single(ReplyCode::TRANSACTION_FAILED, "5.6.0 Malformed message content")
            }
            Self::ContentPolicy => {
                Reply::single(ReplyCode::TRANSACTION_FAILED, "5.6.0 Message has no body")
            }
            Self::Incomplete(_) => {
                Reply::single(ReplyCode::TRANSACTION_FAILED, "5.5.0 Transaction incomplete")
            }
            Self::Auth(_) => Reply::single(
                ReplyCode::LOCAL_ERROR,
                "4.7.0 Upstream authentication failed",
            ),
            Self::Delivery(_) if self.is_transient() => {
                Reply::single(ReplyCode::LOCAL_ERROR, "4.4.0 Delivery failed, try again later")
            }
            Self::Delivery(_) => {
                Reply::single(ReplyCode::TRANSACTION_FAILED, "5.0.0 Delivery rejected")
            }
            Self::Config(_) => {
                Reply::single(ReplyCode::LOCAL_ERROR, "4.3.5 Relay misconfigured")
            }
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
