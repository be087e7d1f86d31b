//! EHLO keywords and SASL mechanisms.

use std::fmt;

/// Service extension advertised after the EHLO greeting line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `AUTH` with the offered mechanisms (RFC 4954).
    Auth(Vec<AuthMechanism>),
    /// `SIZE` with the fixed message limit in bytes (RFC 1870).
    Size(Option<usize>),
    /// `8BITMIME` (RFC 6152).
    EightBitMime,
    /// `PIPELINING` (RFC 2920).
    Pipelining,
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(mechanisms) => {
                write!(f, "AUTH")?;
                for mechanism in mechanisms {
                    write!(f, " {}", mechanism.as_str())?;
                }
                Ok(())
            }
            Self::Size(Some(size)) => write!(f, "SIZE {size}"),
            Self::Size(None) => write!(f, "SIZE"),
            Self::EightBitMime => write!(f, "8BITMIME"),
            Self::Pipelining => write!(f, "PIPELINING"),
        }
    }
}

/// SASL mechanism the relay accepts. Both carry plaintext credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// `PLAIN` (RFC 4616).
    Plain,
    /// `LOGIN`, the draft mechanism older clients still send.
    Login,
}

impl AuthMechanism {
    /// Looks up a mechanism name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [Self::Plain, Self::Login]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Registered name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ehlo_keywords() {
        let lines: Vec<String> = [
            Extension::Auth(vec![AuthMechanism::Plain, AuthMechanism::Login]),
            Extension::Size(Some(26_214_400)),
            Extension::Size(None),
            Extension::EightBitMime,
            Extension::Pipelining,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            lines,
            ["AUTH PLAIN LOGIN", "SIZE 26214400", "SIZE", "8BITMIME", "PIPELINING"]
        );
    }

    #[test]
    fn test_mechanism_names() {
        assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
        assert_eq!(AuthMechanism::parse("LOGIN"), Some(AuthMechanism::Login));
        assert_eq!(AuthMechanism::parse("CRAM-MD5"), None);
        assert_eq!(AuthMechanism::parse("XOAUTH2"), None);
        assert_eq!(AuthMechanism::Login.as_str(), "LOGIN");
    }
}
