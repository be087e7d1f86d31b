//! SMTP commands received from clients.

use crate::error::{Error, Result};
use crate::parser::{parse_mail_parameters, parse_path, split_verb};
use crate::types::{Address, AuthMechanism};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// BODY parameter (7BIT, 8BITMIME)
        body: Option<String>,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// VRFY - Verify address
    Vrfy {
        /// Address to verify
        address: String,
    },
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Parses a command line (without the trailing CRLF).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] for an unrecognized verb,
    /// [`Error::NotImplemented`] for recognized verbs this server does not
    /// offer, and [`Error::Syntax`] or [`Error::InvalidAddress`] for bad
    /// arguments.
    pub fn parse(line: &str) -> Result<Self> {
        let (verb, args) = split_verb(line);

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(Self::Helo {
                hostname: required_hostname(args)?,
            }),
            "EHLO" => Ok(Self::Ehlo {
                hostname: required_hostname(args)?,
            }),
            "AUTH" => {
                let mut parts = args.split_whitespace();
                let name = parts
                    .next()
                    .ok_or_else(|| Error::Syntax("AUTH requires a mechanism".into()))?;
                let mechanism = AuthMechanism::parse(name)
                    .ok_or_else(|| Error::UnsupportedMechanism(name.to_string()))?;
                let initial_response = parts.next().map(str::to_string);
                Ok(Self::Auth {
                    mechanism,
                    initial_response,
                })
            }
            "MAIL" => {
                let rest = strip_keyword(args, "FROM:")
                    .ok_or_else(|| Error::Syntax("Expected MAIL FROM:<address>".into()))?;
                let (path, params) = parse_path(rest)?;
                let from = path.ok_or_else(|| {
                    Error::InvalidAddress("Null reverse-path is not accepted".into())
                })?;
                let params = parse_mail_parameters(params)?;
                Ok(Self::MailFrom {
                    from,
                    body: params.body,
                    size: params.size,
                })
            }
            "RCPT" => {
                let rest = strip_keyword(args, "TO:")
                    .ok_or_else(|| Error::Syntax("Expected RCPT TO:<address>".into()))?;
                let (path, _params) = parse_path(rest)?;
                let to = path
                    .ok_or_else(|| Error::InvalidAddress("Empty forward-path".into()))?;
                Ok(Self::RcptTo { to })
            }
            "DATA" => Ok(Self::Data),
            "RSET" => Ok(Self::Rset),
            "VRFY" => Ok(Self::Vrfy {
                address: args.to_string(),
            }),
            "NOOP" => Ok(Self::Noop),
            "QUIT" => Ok(Self::Quit),
            "STARTTLS" | "EXPN" | "HELP" | "BDAT" | "TURN" | "ETRN" => {
                Err(Error::NotImplemented(verb.to_ascii_uppercase()))
            }
            _ => Err(Error::UnknownCommand(verb.to_string())),
        }
    }

    /// Returns the command verb, for logging.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::Auth { .. } => "AUTH",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Vrfy { .. } => "VRFY",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }
}

fn required_hostname(args: &str) -> Result<String> {
    args.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::Syntax("Hostname required".into()))
}

/// Strips a case-insensitive keyword such as `FROM:`, tolerating a space
/// before the colon's argument.
fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let head = args.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| args[keyword.len()..].trim_start())
}
