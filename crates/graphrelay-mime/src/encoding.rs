//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header decoding.

use crate::charset;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// Whitespace (line breaks in transfer-encoded bodies) is ignored and missing
/// padding is tolerated.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(&cleaned) {
        Ok(bytes) => Ok(bytes),
        Err(_) => STANDARD_NO_PAD
            .decode(cleaned.trim_end_matches('='))
            .map_err(Into::into),
    }
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Works on raw bytes so that the result can be handed to the part's charset
/// decoder afterwards.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(input: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break, possibly with trailing whitespace before the CRLF
        let mut j = i + 1;
        while j < input.len() && (input[j] == b' ' || input[j] == b'\t') {
            j += 1;
        }
        if input.get(j) == Some(&b'\r') && input.get(j + 1) == Some(&b'\n') {
            i = j + 2;
            continue;
        }
        if input.get(j) == Some(&b'\n') {
            i = j + 1;
            continue;
        }
        if j == input.len() {
            // "=" at the very end of the body
            break;
        }

        let hex = input
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::QuotedPrintable("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| Error::QuotedPrintable("Non-ASCII escape sequence".to_string()))?;
        let decoded = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::QuotedPrintable(format!("Invalid hex: {e}")))?;
        result.push(decoded);
        i += 3;
    }

    Ok(result)
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Format: `=?charset?encoding?encoded-text?=`. Whitespace separating two
/// adjacent encoded words is dropped. Malformed words are left untouched.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_encoded_word(candidate) {
            if !(after_word && before.chars().all(char::is_whitespace)) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    out.push_str(rest);
    out
}

/// Decodes a single encoded word at the start of `s`, returning the decoded
/// text and the number of bytes consumed.
fn decode_encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let charset_end = inner.find('?')?;
    let charset = &inner[..charset_end];
    let after_charset = &inner[charset_end + 1..];

    let mut chars = after_charset.chars();
    let encoding = chars.next()?.to_ascii_uppercase();
    if !encoding.is_ascii() || chars.next()? != '?' {
        return None;
    }
    let payload = &after_charset[2..];
    let payload_end = payload.find("?=")?;
    let encoded = &payload[..payload_end];
    if encoded.contains(char::is_whitespace) {
        return None;
    }

    // RFC 2231 allows "charset*language"
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        'B' => decode_base64(encoded).ok()?,
        'Q' => decode_quoted_printable(encoded.replace('_', " ").as_bytes()).ok()?,
        _ => return None,
    };

    let consumed = 2 + charset_end + 1 + 2 + payload_end + 2;
    Some((charset::decode(&bytes, charset), consumed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_decode_wrapped_lines() {
        let decoded = decode_base64("SGVsbG8s\r\nIFdvcmxk\r\nIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_missing_padding() {
        let decoded = decode_base64("SGVsbG8").unwrap();
        assert_eq!(decoded, b"Hello");
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(decode_base64("!!!not base64!!!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");

        let decoded = decode_quoted_printable(b"H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let decoded = decode_quoted_printable(b"Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");

        let decoded = decode_quoted_printable(b"Hello= \nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_keeps_raw_8bit() {
        // Windows-1251 bytes pass through for later charset decoding
        let decoded = decode_quoted_printable(b"=CF=F0").unwrap();
        assert_eq!(decoded, vec![0xCF, 0xF0]);
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable(b"bad =ZZ escape").is_err());
        assert!(decode_quoted_printable(b"cut =A").is_err());
    }

    #[test]
    fn test_rfc2047_plain_text_untouched() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
        assert_eq!(decode_rfc2047("price =? unknown"), "price =? unknown");
    }

    #[test]
    fn test_rfc2047_base64() {
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_rfc2047_quoted_printable() {
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        let decoded = decode_rfc2047("=?utf-8?Q?Hello?= =?utf-8?Q?_World?=");
        assert_eq!(decoded, "Hello World");
    }

    #[test]
    fn test_rfc2047_mixed_with_plain_text() {
        let decoded = decode_rfc2047("Re: =?windows-1251?B?z/Do4uXy?= again");
        assert_eq!(decoded, "Re: Привет again");
    }
}
