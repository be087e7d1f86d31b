//! SMTP command-line parsing helpers.

use crate::error::{Error, Result};
use crate::types::Address;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// ESMTP parameters from a `MAIL FROM` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailParameters {
    /// `BODY=` value, uppercased.
    pub body: Option<String>,
    /// `SIZE=` value.
    pub size: Option<usize>,
}

/// Splits a command line into its verb and the remaining arguments.
#[must_use]
pub fn split_verb(line: &str) -> (&str, &str) {
    let line = line.trim();
    line.split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, args)| (verb, args.trim()))
}

/// Parses a `<path>` argument, returning the address (None for the null
/// path `<>`) and the text after the closing bracket.
///
/// A bare address without brackets is accepted for legacy clients.
///
/// # Errors
///
/// Returns an error if the brackets are unbalanced or the address is
/// invalid.
pub fn parse_path(s: &str) -> Result<(Option<Address>, &str)> {
    let s = s.trim_start();

    let (inner, rest) = if let Some(after_open) = s.strip_prefix('<') {
        let close = after_open
            .find('>')
            .ok_or_else(|| Error::Syntax("Missing closing '>' in path".into()))?;
        (&after_open[..close], &after_open[close + 1..])
    } else {
        s.split_once(char::is_whitespace).unwrap_or((s, ""))
    };

    // Source route: <@relay1,@relay2:user@domain>
    let inner = match inner.strip_prefix('@') {
        Some(route) => route.split_once(':').map_or(inner, |(_, addr)| addr),
        None => inner,
    };

    if inner.is_empty() {
        return Ok((None, rest.trim()));
    }
    Ok((Some(Address::new(inner)?), rest.trim()))
}

/// Parses `MAIL FROM` ESMTP parameters. Unknown parameters are ignored.
///
/// # Errors
///
/// Returns an error if `SIZE` is not a number.
pub fn parse_mail_parameters(params: &str) -> Result<MailParameters> {
    let mut parsed = MailParameters::default();

    for param in params.split_whitespace() {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        match key.to_ascii_uppercase().as_str() {
            "SIZE" => {
                let size = value
                    .parse()
                    .map_err(|_| Error::Syntax(format!("Invalid SIZE parameter: {value}")))?;
                parsed.size = Some(size);
            }
            "BODY" => parsed.body = Some(value.to_ascii_uppercase()),
            _ => {}
        }
    }

    Ok(parsed)
}

/// Decodes one base64 SASL response line into text.
///
/// # Errors
///
/// Returns an error if the line is not valid base64.
pub fn decode_sasl_line(line: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(line.trim())
        .map_err(|e| Error::Syntax(format!("Invalid base64 in AUTH response: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decodes an `AUTH PLAIN` response (`authzid NUL authcid NUL passwd`) into
/// username and password.
///
/// # Errors
///
/// Returns an error if the response is not valid base64 or does not have
/// three NUL-separated fields.
pub fn decode_auth_plain(response: &str) -> Result<(String, String)> {
    let decoded = decode_sasl_line(response)?;
    let mut fields = decoded.split('\0');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(authzid), Some(authcid), Some(password), None) => {
            let username = if authcid.is_empty() { authzid } else { authcid };
            Ok((username.to_string(), password.to_string()))
        }
        _ => Err(Error::Syntax("Malformed AUTH PLAIN response".into())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_verb() {
        assert_eq!(split_verb("MAIL FROM:<a@b.c>"), ("MAIL", "FROM:<a@b.c>"));
        assert_eq!(split_verb("  QUIT  "), ("QUIT", ""));
        assert_eq!(split_verb("EHLO\tclient "), ("EHLO", "client"));
    }

    #[test]
    fn test_parse_path_bracketed() {
        let (addr, rest) = parse_path("<user@example.com> SIZE=10").unwrap();
        assert_eq!(addr.unwrap().as_str(), "user@example.com");
        assert_eq!(rest, "SIZE=10");
    }

    #[test]
    fn test_parse_path_null() {
        let (addr, rest) = parse_path("<>").unwrap();
        assert!(addr.is_none());
        assert_eq!(rest, "");
    }

    #[test]
    fn test_parse_path_bare() {
        let (addr, rest) = parse_path("user@example.com BODY=7BIT").unwrap();
        assert_eq!(addr.unwrap().as_str(), "user@example.com");
        assert_eq!(rest, "BODY=7BIT");
    }

    #[test]
    fn test_parse_path_source_route() {
        let (addr, _) = parse_path("<@relay.example,@other.example:user@example.com>").unwrap();
        assert_eq!(addr.unwrap().as_str(), "user@example.com");
    }

    #[test]
    fn test_parse_path_errors() {
        assert!(parse_path("<user@example.com").is_err());
        assert!(parse_path("<not-an-address>").is_err());
    }

    #[test]
    fn test_mail_parameters() {
        let params = parse_mail_parameters("SIZE=1024 body=8bitmime SMTPUTF8").unwrap();
        assert_eq!(params.size, Some(1024));
        assert_eq!(params.body.as_deref(), Some("8BITMIME"));
        assert!(parse_mail_parameters("SIZE=lots").is_err());
    }

    #[test]
    fn test_decode_auth_plain() {
        // "\0user\0pass"
        let (user, pass) = decode_auth_plain("AHVzZXIAcGFzcw==").unwrap();
        assert_eq!(user, "user");
        assert_eq!(pass, "pass");
    }

    #[test]
    fn test_decode_auth_plain_authzid_only() {
        // "admin\0\0secret"
        let (user, pass) = decode_auth_plain("YWRtaW4AAHNlY3JldA==").unwrap();
        assert_eq!(user, "admin");
        assert_eq!(pass, "secret");
    }

    #[test]
    fn test_decode_auth_plain_errors() {
        assert!(decode_auth_plain("!!!").is_err());
        // "no-separators"
        assert!(decode_auth_plain("bm8tc2VwYXJhdG9ycw==").is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_path_never_panics(input in "\\PC*") {
            let _ = parse_path(&input);
        }

        #[test]
        fn prop_bracketed_addresses_roundtrip(
            local in "[a-zA-Z0-9._%+-]{1,32}",
            domain in "[a-z0-9-]{1,20}\\.[a-z]{2,6}",
        ) {
            let address = format!("{local}@{domain}");
            let path = format!("<{address}>");
            let (parsed, rest) = parse_path(&path).unwrap();
            let parsed = parsed.unwrap();
            prop_assert_eq!(parsed.as_str(), address.as_str());
            prop_assert_eq!(rest, "");
        }
    }
}
