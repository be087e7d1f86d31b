//! Error types for SMTP operations.

use crate::types::{Reply, ReplyCode};
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Command verb not recognized.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command recognized but its arguments are malformed.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Command recognized but not offered by this server.
    #[error("Command not implemented: {0}")]
    NotImplemented(String),

    /// AUTH mechanism not offered by this server.
    #[error("Unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Client stayed idle longer than the command timeout.
    #[error("Command timeout")]
    Timeout,
}

impl Error {
    /// Converts a protocol-level error into the reply sent to the client.
    ///
    /// I/O errors map to 421 since the connection is about to close.
    #[must_use]
    pub fn to_reply(&self) -> Reply {
        match self {
            Self::UnknownCommand(_) => {
                Reply::single(ReplyCode::SYNTAX_ERROR, "5.5.2 Command unrecognized")
            }
            Self::Syntax(message) | Self::InvalidAddress(message) => {
                Reply::single(ReplyCode::PARAMETER_ERROR, format!("5.5.4 {message}"))
            }
            Self::NotImplemented(_) => {
                Reply::single(ReplyCode::NOT_IMPLEMENTED, "5.5.1 Command not implemented")
            }
            Self::UnsupportedMechanism(_) => Reply::single(
                ReplyCode::PARAMETER_NOT_IMPLEMENTED,
                "5.5.4 Unrecognized authentication type",
            ),
            Self::Timeout => Reply::single(
                ReplyCode::SERVICE_UNAVAILABLE,
                "4.4.2 Idle timeout, closing connection",
            ),
            Self::Io(_) => Reply::single(
                ReplyCode::SERVICE_UNAVAILABLE,
                "4.3.0 Connection error, closing",
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_mapping() {
        assert_eq!(
            Error::UnknownCommand("FOO".into()).to_reply().code,
            ReplyCode::SYNTAX_ERROR
        );
        assert_eq!(
            Error::Syntax("bad".into()).to_reply().code,
            ReplyCode::PARAMETER_ERROR
        );
        assert_eq!(
            Error::InvalidAddress("bad".into()).to_reply().code,
            ReplyCode::PARAMETER_ERROR
        );
        assert_eq!(
            Error::NotImplemented("STARTTLS".into()).to_reply().code,
            ReplyCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            Error::UnsupportedMechanism("CRAM-MD5".into()).to_reply().code,
            ReplyCode::PARAMETER_NOT_IMPLEMENTED
        );
        assert_eq!(Error::Timeout.to_reply().code, ReplyCode::SERVICE_UNAVAILABLE);
    }
}
