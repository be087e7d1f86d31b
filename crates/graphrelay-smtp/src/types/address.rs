//! Envelope paths.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Longest reverse- or forward-path accepted (RFC 5321 section 4.5.3.1.3).
const MAX_PATH_LENGTH: usize = 256;

/// Mailbox taken from `MAIL FROM:<...>` or `RCPT TO:<...>`.
///
/// Only the shape is checked: one `@` outside a quoted local part, no
/// whitespace and a bounded length. Case is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates and wraps a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] naming the first problem found.
    pub fn new(mailbox: impl Into<String>) -> Result<Self> {
        let mailbox = mailbox.into();
        match problem(&mailbox) {
            Some(reason) => Err(Error::InvalidAddress(reason.to_string())),
            None => Ok(Self(mailbox)),
        }
    }

    /// The mailbox text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part after the last `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

fn problem(mailbox: &str) -> Option<&'static str> {
    if mailbox.is_empty() {
        return Some("Address cannot be empty");
    }
    if mailbox.len() > MAX_PATH_LENGTH {
        return Some("Address too long");
    }
    if mailbox.contains(|c: char| c.is_whitespace() || c.is_control()) {
        return Some("Address cannot contain whitespace");
    }
    let Some((local, domain)) = mailbox.rsplit_once('@') else {
        return Some("Address must contain @");
    };
    if local.is_empty() || domain.is_empty() {
        return Some("Local and domain parts cannot be empty");
    }
    if local.contains('@') && !(local.starts_with('"') && local.ends_with('"')) {
        return Some("Address must have exactly one @");
    }
    None
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
