//! Errors raised while taking a message apart.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a message or part could not be parsed or decoded.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input holds no header block at all.
    #[error("Message is empty")]
    EmptyMessage,

    /// A header line is neither `name: value` nor a continuation.
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    /// `Content-Type` has no usable `type/subtype`.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// A `multipart/*` part declares no boundary.
    #[error("Multipart part has no boundary parameter")]
    MissingBoundary,

    /// Quoted-printable data is broken.
    #[error("Bad quoted-printable data: {0}")]
    QuotedPrintable(String),

    /// Base64 data is broken.
    #[error("Bad base64 data: {0}")]
    Base64(#[from] base64::DecodeError),
}
