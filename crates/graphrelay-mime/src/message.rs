//! MIME message structure and handling.

use crate::address::{Mailbox, parse_address_list};
use crate::charset;
use crate::content_type::{ContentType, parse_parameters, split_parameters};
use crate::encoding::{decode_base64, decode_quoted_printable, decode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;
use tracing::warn;

/// Nesting limit for multipart bodies. Deeper containers are kept as opaque
/// leaves.
const MAX_DEPTH: usize = 16;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Content disposition of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Displayed as part of the message.
    Inline,
    /// Offered as a separate file.
    Attachment,
}

/// MIME message part.
///
/// Multipart containers hold their children in `parts`; leaves keep their
/// still transfer-encoded body in `body`.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw bytes, transfer encoding not yet removed).
    pub body: Vec<u8>,
    /// Child parts of a multipart container.
    pub parts: Vec<Part>,
}

impl Part {
    /// Creates a new leaf part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            body,
            parts: Vec::new(),
        }
    }

    /// Parses a part, recursing into multipart bodies.
    ///
    /// Only failures of the outermost entity are errors. A nested part with
    /// a malformed header block or a boundary-less multipart type is skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the header block is malformed or the entity is a
    /// multipart container without a boundary.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::parse_nested(raw, 0)
    }

    fn parse_nested(raw: &[u8], depth: usize) -> Result<Self> {
        let (header_bytes, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes))?;
        let mut part = Self::new(headers, body.to_vec());

        let Some(content_type) = part.content_type().ok().filter(ContentType::is_multipart)
        else {
            return Ok(part);
        };
        if depth >= MAX_DEPTH {
            return Ok(part);
        }

        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        part.parts = split_multipart(body, boundary)
            .into_iter()
            .enumerate()
            .filter_map(|(index, child)| {
                Self::parse_nested(child, depth + 1)
                    .inspect_err(|e| warn!(error = %e, depth = depth + 1, index, "Skipping unparseable body part"))
                    .ok()
            })
            .collect();
        Ok(part)
    }

    /// Gets the content type, defaulting to `text/plain` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Checks if this part is a multipart container.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type().is_ok_and(|ct| ct.is_multipart())
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Gets the declared content disposition, `None` when the header is
    /// absent or names neither `inline` nor `attachment`.
    #[must_use]
    pub fn disposition(&self) -> Option<Disposition> {
        let value = self.headers.get("content-disposition")?;
        let kind = split_parameters(value).first().map(|s| s.trim().to_string())?;
        if kind.eq_ignore_ascii_case("attachment") {
            Some(Disposition::Attachment)
        } else if kind.eq_ignore_ascii_case("inline") {
            Some(Disposition::Inline)
        } else {
            None
        }
    }

    /// Returns true if the part belongs to the message body: an explicit
    /// `inline` disposition, or a `text/*` part not marked as attachment.
    /// Everything else is an attachment.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        match self.disposition() {
            Some(Disposition::Inline) => true,
            Some(Disposition::Attachment) => false,
            None => self.content_type().is_ok_and(|ct| ct.is_text()),
        }
    }

    /// Gets the file name from `Content-Disposition`, falling back to the
    /// `Content-Type` `name` parameter.
    ///
    /// RFC 2231 extended parameters and RFC 2047 encoded words are decoded.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let from_disposition = self.headers.get("content-disposition").and_then(|value| {
            parse_parameters(split_parameters(value).into_iter().skip(1))
                .remove("filename")
        });

        from_disposition
            .or_else(|| {
                self.content_type()
                    .ok()
                    .and_then(|ct| ct.name().map(str::to_string))
            })
            .map(|name| decode_rfc2047(&name))
            .filter(|name| !name.trim().is_empty())
    }

    /// Gets the Content-ID with surrounding angle brackets removed.
    #[must_use]
    pub fn content_id(&self) -> Option<String> {
        self.headers
            .get("content-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
            .filter(|id| !id.is_empty())
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&String::from_utf8_lossy(&self.body)),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(&self.body),
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as UTF-8 text, converting from the declared
    /// charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        let content_type = self.content_type().unwrap_or_else(|_| ContentType::text_plain());
        let label = content_type.charset().unwrap_or("us-ascii");
        Ok(charset::decode(&decoded, label))
    }

    /// Returns the non-container parts in document order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        if self.is_multipart() {
            for child in &self.parts {
                child.collect_leaves(out);
            }
        } else {
            out.push(self);
        }
    }
}

/// Parsed MIME message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Top-level entity.
    pub root: Part,
}

impl Message {
    /// Parses a complete message.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, a malformed header block or a
    /// multipart entity without a boundary.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::EmptyMessage);
        }
        Ok(Self {
            root: Part::parse(raw)?,
        })
    }

    /// Gets the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Gets the decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.root.headers.get_decoded("subject")
    }

    /// Gets every mailbox from all `To` headers.
    #[must_use]
    pub fn to(&self) -> Vec<Mailbox> {
        self.address_header("to")
    }

    /// Gets every mailbox from all `Cc` headers.
    #[must_use]
    pub fn cc(&self) -> Vec<Mailbox> {
        self.address_header("cc")
    }

    fn address_header(&self, name: &str) -> Vec<Mailbox> {
        self.root
            .headers
            .get_all(name)
            .into_iter()
            .flat_map(parse_address_list)
            .collect()
    }

    /// Returns the non-container parts in document order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Part> {
        self.root.leaves()
    }
}

/// Splits an entity at the first empty line into header block and body.
/// Without an empty line everything is header.
#[must_use]
pub fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&[], body);
    }
    if let Some(body) = raw.strip_prefix(b"\n") {
        return (&[], body);
    }

    let mut pos = 0;
    while let Some(offset) = raw[pos..].iter().position(|&b| b == b'\n') {
        let line_end = pos + offset + 1;
        let rest = &raw[line_end..];
        if let Some(body) = rest.strip_prefix(b"\r\n") {
            return (&raw[..line_end], body);
        }
        if let Some(body) = rest.strip_prefix(b"\n") {
            return (&raw[..line_end], body);
        }
        pos = line_end;
    }

    (raw, &[])
}

/// Splits a multipart body into the raw entities between delimiter lines.
///
/// The preamble and epilogue are discarded. A body whose closing delimiter
/// is missing keeps everything after the last delimiter as its final part.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |offset| pos + offset + 1);
        let line = trim_line_ending(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest.starts_with(b"--");
            let padding = if closing { &rest[2..] } else { rest };
            if padding.iter().all(|b| matches!(b, b' ' | b'\t')) {
                if let Some(s) = start.take() {
                    parts.push(trim_line_ending(&body[s..pos]));
                }
                if closing {
                    return parts;
                }
                start = Some(line_end);
            }
        }
        pos = line_end;
    }

    if let Some(s) = start {
        parts.push(&body[s..]);
    }
    parts
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
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

    const MIXED: &str = concat!(
        "From: sender@example.com\r\n",
        "To: Alice <alice@example.com>, bob@example.com\r\n",
        "Cc: carol@example.com\r\n",
        "Subject: =?utf-8?Q?Quarterly_r=C3=A9port?=\r\n",
        "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
        "\r\n",
        "This is the preamble.\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=inner\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Plain body\r\n",
        "--inner\r\n",
        "Content-Type: text/html; charset=windows-1251\r\n",
        "Content-Transfer-Encoding: quoted-printable\r\n",
        "\r\n",
        "<p>=CF=F0=E8=E2=E5=F2</p>\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: application/pdf; name=\"legacy.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0=\r\n",
        "--outer--\r\n",
        "epilogue\r\n"
    );

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_single_part() {
        let raw = b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHello, World!\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.subject().as_deref(), Some("Hi"));

        let leaves = message.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].body_text().unwrap(), "Hello, World!\r\n");
        assert_eq!(leaves[0].disposition(), None);
        assert!(leaves[0].is_inline());
    }

    #[test]
    fn test_lf_only_line_endings() {
        let message = Message::parse(b"Subject: Unix\n\nbody\n").unwrap();
        assert_eq!(message.subject().as_deref(), Some("Unix"));
        assert_eq!(message.root.body, b"body\n");
    }

    #[test]
    fn test_nested_multipart_walk() {
        let message = Message::parse(MIXED.as_bytes()).unwrap();
        assert_eq!(message.subject().as_deref(), Some("Quarterly réport"));

        let leaves = message.leaves();
        assert_eq!(leaves.len(), 3);
        assert!(leaves[0].content_type().unwrap().is("text", "plain"));
        assert_eq!(leaves[0].body_text().unwrap(), "Plain body");
        assert_eq!(leaves[1].body_text().unwrap(), "<p>Привет</p>");

        let attachment = leaves[2];
        assert_eq!(attachment.disposition(), Some(Disposition::Attachment));
        assert!(!attachment.is_inline());
        assert_eq!(attachment.filename().as_deref(), Some("report.pdf"));
        assert_eq!(attachment.decode_body().unwrap(), b"%PDF-");
    }

    #[test]
    fn test_address_headers() {
        let message = Message::parse(MIXED.as_bytes()).unwrap();
        let to: Vec<_> = message.to().into_iter().map(|m| m.address).collect();
        assert_eq!(to, vec!["alice@example.com", "bob@example.com"]);
        assert_eq!(message.cc()[0].address, "carol@example.com");
    }

    #[test]
    fn test_filename_falls_back_to_name_parameter() {
        let mut headers = Headers::new();
        headers.push("Content-Type", "image/png; name=\"=?utf-8?B?0YTQvtGC0L4=?=.png\"");
        let part = Part::new(headers, Vec::new());
        assert_eq!(part.filename().as_deref(), Some("фото.png"));
    }

    #[test]
    fn test_filename_rfc2231() {
        let mut headers = Headers::new();
        headers.push(
            "Content-Disposition",
            "attachment; filename*=utf-8''%D0%BE%D1%82%D1%87%D1%91%D1%82.txt",
        );
        let part = Part::new(headers, Vec::new());
        assert_eq!(part.filename().as_deref(), Some("отчёт.txt"));
    }

    fn part_with(headers: &[(&str, &str)]) -> Part {
        let mut block = Headers::new();
        for (name, value) in headers {
            block.push(*name, *value);
        }
        Part::new(block, Vec::new())
    }

    #[test]
    fn test_inline_classification() {
        assert!(part_with(&[]).is_inline());
        assert!(part_with(&[("Content-Type", "text/html")]).is_inline());
        assert!(part_with(&[("Content-Type", "image/png"), ("Content-Disposition", "INLINE")]).is_inline());
        assert!(!part_with(&[("Content-Type", "application/pdf; name=\"report.pdf\"")]).is_inline());
        assert!(!part_with(&[("Content-Type", "image/png")]).is_inline());
        assert!(!part_with(&[("Content-Type", "text/plain"), ("Content-Disposition", "attachment")]).is_inline());
        assert!(part_with(&[("Content-Disposition", "form-data; name=x")]).disposition().is_none());
    }

    #[test]
    fn test_split_header_body() {
        assert_eq!(split_header_body(b"A: 1\r\n\r\nbody"), (&b"A: 1\r\n"[..], &b"body"[..]));
        assert_eq!(split_header_body(b"A: 1\n\nbody"), (&b"A: 1\n"[..], &b"body"[..]));
        assert_eq!(split_header_body(b"\r\nbody"), (&b""[..], &b"body"[..]));
        assert_eq!(split_header_body(b"A: 1\r\n"), (&b"A: 1\r\n"[..], &b""[..]));
    }

    #[test]
    fn test_bad_child_part_is_skipped() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "kept\r\n",
            "--b\r\n",
            "bogus header line\r\n",
            "\r\n",
            "lost\r\n",
            "--b\r\n",
            "Content-Type: multipart/alternative\r\n",
            "\r\n",
            "no boundary\r\n",
            "--b--\r\n"
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.root.parts.len(), 1);
        let leaves = message.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].body_text().unwrap(), "kept");
    }

    #[test]
    fn test_content_id_brackets_trimmed() {
        let mut headers = Headers::new();
        headers.push("Content-ID", " <logo@example> ");
        let part = Part::new(headers, Vec::new());
        assert_eq!(part.content_id().as_deref(), Some("logo@example"));
    }

    #[test]
    fn test_unterminated_multipart_keeps_last_part() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "\r\n",
            "first\r\n",
            "--b\r\n",
            "\r\n",
            "second, never closed\r\n"
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        let leaves = message.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].body, b"first");
        assert_eq!(leaves[1].body, b"second, never closed\r\n");
    }

    #[test]
    fn test_multipart_without_delimiters_has_no_leaves() {
        let raw = "Content-Type: multipart/mixed; boundary=b\r\n\r\nno parts here\r\n";
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert!(message.leaves().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Message::parse(b""), Err(Error::EmptyMessage)));
        assert!(matches!(Message::parse(b" \r\n"), Err(Error::EmptyMessage)));
        assert!(matches!(
            Message::parse(b"Content-Type: multipart/mixed\r\n\r\nbody"),
            Err(Error::MissingBoundary)
        ));
        assert!(matches!(
            Message::parse(b"garbage line\r\n\r\nbody"),
            Err(Error::MalformedHeader(_))
        ));
    }
}
