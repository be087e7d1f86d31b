//! Header blocks.

use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};

/// Header fields of a message or body part, in wire order.
///
/// Lookups are case-insensitive; the original spelling of each name is
/// kept for logging.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First value of `name` with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Every value of `name`, in order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Fields as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a header block up to the first empty line, unfolding
    /// continuation lines with a single space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] for a line that is neither a
    /// continuation nor `name: value`, or a block that opens with a
    /// continuation.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                let (_, value) = headers.fields.last_mut().ok_or_else(|| {
                    Error::MalformedHeader(format!("Continuation without header: {line}"))
                })?;
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::MalformedHeader(format!("Missing colon: {line}")))?;
            let name = name.trim_end();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(Error::MalformedHeader(format!("Bad header name: {line}")));
            }
            headers.push(name, value.trim());
        }

        Ok(headers)
    }
}
