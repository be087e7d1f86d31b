//! MIME content type handling.

use crate::charset;
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates the RFC 2045 default content type, `text/plain; charset=us-ascii`.
    #[must_use]
    pub fn text_plain() -> Self {
        let mut ct = Self::new("text", "plain");
        ct.parameters
            .insert("charset".to_string(), "us-ascii".to_string());
        ct
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the legacy `name` parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Checks if this is an image content type.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("image")
    }

    /// Checks the type and subtype, ignoring case.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_parameters(s).into_iter();

        // Parse type/subtype
        let type_str = segments
            .next()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidContentType("Empty content type".to_string()))?;

        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype: {type_str}")))?;

        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(type_str.to_string()));
        }

        let mut content_type = Self::new(main_type, sub_type);
        content_type.parameters = parse_parameters(segments);
        Ok(content_type)
    }
}

/// Splits a structured header value on `;`, ignoring separators inside
/// quoted strings.
pub(crate) fn split_parameters(s: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&s[start..]);
    segments
}

/// Parses `key=value` segments into a parameter map.
///
/// Keys are lowercased. RFC 2231 extended parameters (`name*`, `name*0*`,
/// `name*1`) are reassembled, percent-decoded and converted from their
/// declared charset, and take precedence over a plain parameter of the same
/// name.
pub(crate) fn parse_parameters<'a>(
    segments: impl IntoIterator<Item = &'a str>,
) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    let mut extended: HashMap<String, Vec<(u32, bool, String)>> = HashMap::new();

    for segment in segments {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value.trim());

        if let Some((base, rest)) = key.split_once('*') {
            let encoded = rest.is_empty() || rest.ends_with('*');
            let index = rest.trim_end_matches('*').parse().unwrap_or(0);
            extended
                .entry(base.to_string())
                .or_default()
                .push((index, encoded, value));
        } else {
            parameters.insert(key, value);
        }
    }

    for (base, mut sections) in extended {
        sections.sort_by_key(|(index, ..)| *index);

        let mut declared_charset: Option<String> = None;
        let mut bytes = Vec::new();
        for (index, encoded, value) in &sections {
            if !encoded {
                bytes.extend_from_slice(value.as_bytes());
                continue;
            }
            let mut payload = value.as_str();
            if *index == 0 {
                let mut pieces = payload.splitn(3, '\'');
                if let (Some(cs), Some(_language), Some(rest)) =
                    (pieces.next(), pieces.next(), pieces.next())
                {
                    declared_charset = Some(cs.to_string());
                    payload = rest;
                }
            }
            bytes.extend(percent_decode_str(payload));
        }

        let label = declared_charset
            .filter(|cs| !cs.is_empty())
            .unwrap_or_else(|| "utf-8".to_string());
        parameters.insert(base, charset::decode(&bytes, &label));
    }

    parameters
}

/// Strips surrounding quotes and backslash escapes from a parameter value.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}
