//! Character set conversion to UTF-8.
//!
//! Labels are resolved with the WHATWG encoding registry, so aliases such as
//! `cp1251`, `latin1` or `koi8-r` work the same as their canonical names.

use encoding_rs::{Encoding, UTF_8};

/// Returns true if the charset label is recognized.
#[must_use]
pub fn is_known(label: &str) -> bool {
    Encoding::for_label(label.trim().as_bytes()).is_some()
}

/// Decodes bytes in the given charset to a UTF-8 string.
///
/// Unknown labels fall back to UTF-8. Malformed sequences are replaced with
/// U+FFFD rather than failing, mirroring how mail clients display them.
#[must_use]
pub fn decode(bytes: &[u8], label: &str) -> String {
    let encoding = Encoding::for_label(label.trim().as_bytes()).unwrap_or(UTF_8);
    let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode("Héllo".as_bytes(), "utf-8"), "Héllo");
        assert_eq!(decode("Héllo".as_bytes(), "UTF-8"), "Héllo");
    }

    #[test]
    fn test_decode_windows_1251() {
        // "Привет" in Windows-1251
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(decode(&bytes, "windows-1251"), "Привет");
        assert_eq!(decode(&bytes, "cp1251"), "Привет");
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode(&[0x63, 0x61, 0x66, 0xE9], "iso-8859-1"), "café");
    }

    #[test]
    fn test_unknown_label_falls_back_to_utf8() {
        assert!(!is_known("x-no-such-charset"));
        assert_eq!(decode(b"plain", "x-no-such-charset"), "plain");
    }

    #[test]
    fn test_malformed_bytes_are_replaced() {
        let text = decode(&[0x61, 0xFF, 0x62], "utf-8");
        assert_eq!(text, "a\u{FFFD}b");
    }
}
