//! Conversion of received MIME messages into Graph message resources.

use crate::error::{Error, Result};
use crate::graph::{BodyType, FileAttachment, GraphMessage, ItemBody, Recipient};
use graphrelay_mime::encoding::encode_base64;
use graphrelay_mime::{ContentType, Mailbox, Message, Part};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Subject used when the message has none.
pub const NO_SUBJECT: &str = "No Subject";

/// Image subtypes that are inlined as data URIs.
const INLINE_IMAGE_TYPES: [&str; 5] = ["png", "jpeg", "jpg", "bmp", "gif"];

/// Name given to attachments that carry no file name.
const UNNAMED_ATTACHMENT: &str = "attachment";

/// Builds a Graph message from raw message data and the envelope
/// recipients.
///
/// Envelope recipients missing from the `To` and `Cc` headers become Bcc
/// recipients. HTML is preferred over plain text, and inline images
/// referenced as `cid:` are embedded as data URIs.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the message structure cannot be parsed and
/// [`Error::ContentPolicy`] if it has no text or HTML body.
pub fn transform(raw: &[u8], envelope_recipients: &[String]) -> Result<GraphMessage> {
    let message = Message::parse(raw)?;

    let subject = message
        .subject()
        .filter(|subject| !subject.trim().is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let to = addresses(message.to());
    let cc = addresses(message.cc());
    let known: HashSet<String> = to.iter().chain(&cc).map(|a| a.to_ascii_lowercase()).collect();
    let bcc: Vec<String> = envelope_recipients
        .iter()
        .filter(|rcpt| !known.contains(&rcpt.to_ascii_lowercase()))
        .cloned()
        .collect();

    let content = walk(&message);
    let html = content.html.filter(|html| !html.is_empty());
    let text = content.text.filter(|text| !text.is_empty());
    let (content_type, body) = match (html, text) {
        (Some(html), _) => (BodyType::Html, content.images.embed(html)),
        (None, Some(text)) => (BodyType::Text, text),
        (None, None) => return Err(Error::ContentPolicy),
    };

    debug!(
        %subject,
        to = to.len(),
        cc = cc.len(),
        bcc = bcc.len(),
        attachments = content.attachments.len(),
        "Transformed message"
    );

    Ok(GraphMessage {
        subject,
        body: ItemBody {
            content_type,
            content: body,
        },
        to_recipients: to.into_iter().map(Recipient::new).collect(),
        cc_recipients: cc.into_iter().map(Recipient::new).collect(),
        bcc_recipients: bcc.into_iter().map(Recipient::new).collect(),
        attachments: content.attachments,
    })
}

fn addresses(mailboxes: Vec<Mailbox>) -> Vec<String> {
    mailboxes.into_iter().map(|mailbox| mailbox.address).collect()
}

/// Everything collected from the leaf parts.
#[derive(Default)]
struct Content {
    text: Option<String>,
    html: Option<String>,
    images: InlineImages,
    attachments: Vec<FileAttachment>,
}

/// Inline images keyed by Content-ID, applied once the walk is done.
#[derive(Default)]
struct InlineImages(Vec<(String, String)>);

impl InlineImages {
    fn embed(&self, mut html: String) -> String {
        for (content_id, data_uri) in &self.0 {
            html = html.replace(&format!("cid:{content_id}"), data_uri);
        }
        html
    }
}

fn walk(message: &Message) -> Content {
    let mut content = Content::default();

    for part in message.leaves() {
        let content_type = match part.content_type() {
            Ok(content_type) => content_type,
            Err(e) => {
                warn!(error = %e, "Skipping part with invalid Content-Type");
                continue;
            }
        };

        // Related images often carry a Content-ID but no disposition.
        let referenced_image = part.disposition().is_none()
            && is_inline_image(&content_type)
            && part.content_id().is_some();
        if !part.is_inline() && !referenced_image {
            push_attachment(part, &content_type, &mut content.attachments);
            continue;
        }

        if content_type.is("text", "plain") {
            if content.text.is_none() {
                content.text = decode_text(part);
            }
        } else if content_type.is("text", "html") {
            if content.html.is_none() {
                content.html = decode_text(part);
            }
        } else if is_inline_image(&content_type) {
            inline_image(part, &content_type, &mut content.images);
        } else {
            push_attachment(part, &content_type, &mut content.attachments);
        }
    }

    content
}

fn decode_text(part: &Part) -> Option<String> {
    part.body_text()
        .inspect_err(|e| warn!(error = %e, "Skipping undecodable text part"))
        .ok()
}

fn is_inline_image(content_type: &ContentType) -> bool {
    content_type.is_image()
        && INLINE_IMAGE_TYPES
            .iter()
            .any(|sub| content_type.sub_type.eq_ignore_ascii_case(sub))
}

fn inline_image(part: &Part, content_type: &ContentType, images: &mut InlineImages) {
    let Some(content_id) = part.content_id() else {
        warn!(content_type = %content_type.essence(), "Dropping inline image without Content-ID");
        return;
    };
    match part.decode_body() {
        Ok(bytes) => images.0.push((
            content_id,
            format!("data:{};base64,{}", content_type.essence(), encode_base64(&bytes)),
        )),
        Err(e) => warn!(error = %e, %content_id, "Skipping undecodable inline image"),
    }
}

fn push_attachment(part: &Part, content_type: &ContentType, attachments: &mut Vec<FileAttachment>) {
    match attachment(part, content_type) {
        Ok(file) => attachments.push(file),
        Err(e) => warn!(error = %e, "Skipping undecodable attachment"),
    }
}

fn attachment(part: &Part, content_type: &ContentType) -> graphrelay_mime::Result<FileAttachment> {
    let bytes = part.decode_body()?;
    let name = part
        .filename()
        .unwrap_or_else(|| UNNAMED_ATTACHMENT.to_string());
    Ok(FileAttachment::new(name, content_type.essence(), encode_base64(&bytes)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::graph::FILE_ATTACHMENT_TYPE;

    fn rcpts(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn addresses_of(recipients: &[Recipient]) -> Vec<&str> {
        recipients
            .iter()
            .map(|r| r.email_address.address.as_str())
            .collect()
    }

    #[test]
    fn test_plain_text_message() {
        let raw = b"Subject: Hello\r\nTo: a@example.com\r\n\r\nJust text.\r\n";
        let message = transform(raw, &rcpts(&["a@example.com"])).unwrap();

        assert_eq!(message.subject, "Hello");
        assert_eq!(message.body.content_type, BodyType::Text);
        assert_eq!(message.body.content, "Just text.\r\n");
        assert_eq!(addresses_of(&message.to_recipients), ["a@example.com"]);
        assert!(message.bcc_recipients.is_empty());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_missing_subject_placeholder() {
        let message = transform(b"To: a@example.com\r\n\r\nbody", &[]).unwrap();
        assert_eq!(message.subject, NO_SUBJECT);
    }

    #[test]
    fn test_bcc_inference_is_case_insensitive() {
        let raw = b"To: Alice <A@Example.com>\r\nCc: c@example.com\r\nSubject: x\r\n\r\nhi";
        let message = transform(
            raw,
            &rcpts(&["a@example.com", "c@example.com", "hidden@example.com"]),
        )
        .unwrap();

        assert_eq!(addresses_of(&message.to_recipients), ["A@Example.com"]);
        assert_eq!(addresses_of(&message.cc_recipients), ["c@example.com"]);
        assert_eq!(addresses_of(&message.bcc_recipients), ["hidden@example.com"]);
    }

    #[test]
    fn test_html_preferred_over_text() {
        let raw = b"Subject: Alt\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain version\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html version</p>\r\n\
--b1--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.body.content_type, BodyType::Html);
        assert_eq!(message.body.content, "<p>html version</p>");
    }

    #[test]
    fn test_first_text_part_wins() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
\r\n\
first\r\n\
--b\r\n\
\r\n\
second\r\n\
--b--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.body.content, "first");
    }

    #[test]
    fn test_charset_decoding() {
        // "Привет" in windows-1251, quoted-printable
        let raw = b"Subject: =?utf-8?B?0J/RgNC40LLQtdGC?=\r\n\
Content-Type: text/plain; charset=windows-1251\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
=CF=F0=E8=E2=E5=F2";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.subject, "Привет");
        assert_eq!(message.body.content, "Привет");
    }

    #[test]
    fn test_inline_image_embedded_regardless_of_order() {
        let raw = b"Subject: Logo\r\n\
Content-Type: multipart/related; boundary=rel\r\n\
\r\n\
--rel\r\n\
Content-Type: image/png\r\n\
Content-ID: <logo@x>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw==\r\n\
--rel\r\n\
Content-Type: text/html\r\n\
\r\n\
<img src=\"cid:logo@x\">\r\n\
--rel--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.body.content_type, BodyType::Html);
        assert_eq!(
            message.body.content,
            "<img src=\"data:image/png;base64,iVBORw==\">"
        );
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_attachment() {
        let raw = b"Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=mix\r\n\
\r\n\
--mix\r\n\
Content-Type: text/plain\r\n\
\r\n\
See attached.\r\n\
--mix\r\n\
Content-Type: application/pdf; name=\"ignored.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--mix--\r\n";
        let message = transform(raw, &[]).unwrap();

        assert_eq!(message.attachments.len(), 1);
        let file = &message.attachments[0];
        assert_eq!(file.odata_type, FILE_ATTACHMENT_TYPE);
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.content_bytes, "JVBERi0=");
    }

    #[test]
    fn test_part_without_disposition_is_attachment() {
        let raw = b"Subject: Scan\r\n\
Content-Type: multipart/mixed; boundary=mix\r\n\
\r\n\
--mix\r\n\
Content-Type: text/plain\r\n\
\r\n\
Scan attached.\r\n\
--mix\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--mix\r\n\
Content-Type: image/jpeg; name=photo.jpg\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
/9j/\r\n\
--mix--\r\n";
        let message = transform(raw, &[]).unwrap();

        assert_eq!(message.body.content, "Scan attached.");
        let names: Vec<&str> = message.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["report.pdf", "photo.jpg"]);
        assert_eq!(message.attachments[0].content_type, "application/pdf");
        assert_eq!(message.attachments[1].content_bytes, "/9j/");
    }

    #[test]
    fn test_explicit_inline_non_text_part_is_attachment() {
        let raw = b"Content-Type: multipart/mixed; boundary=mix\r\n\
\r\n\
--mix\r\n\
\r\n\
body\r\n\
--mix\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: inline; filename=view.pdf\r\n\
\r\n\
%PDF-\r\n\
--mix--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].name, "view.pdf");
    }

    #[test]
    fn test_inline_image_without_content_id_dropped() {
        let raw = b"Content-Type: multipart/related; boundary=rel\r\n\
\r\n\
--rel\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>hi</p>\r\n\
--rel\r\n\
Content-Type: image/gif\r\n\
Content-Disposition: inline\r\n\
\r\n\
GIF89a\r\n\
--rel--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.body.content, "<p>hi</p>");
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_empty_body_violates_content_policy() {
        assert!(matches!(
            transform(b"Subject: x\r\nTo: a@b.c\r\n\r\n", &[]),
            Err(Error::ContentPolicy)
        ));
        let empty_parts = b"Content-Type: multipart/alternative; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
\r\n\
--b--\r\n";
        assert!(matches!(transform(empty_parts, &[]), Err(Error::ContentPolicy)));
    }

    #[test]
    fn test_empty_html_falls_back_to_text() {
        let raw = b"Content-Type: multipart/alternative; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
\r\n\
--b--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.body.content_type, BodyType::Text);
        assert_eq!(message.body.content, "plain");
    }

    #[test]
    fn test_attachment_only_violates_content_policy() {
        let raw = b"Content-Type: multipart/mixed; boundary=mix\r\n\
\r\n\
--mix\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=a.bin\r\n\
\r\n\
data\r\n\
--mix--\r\n";
        assert!(matches!(transform(raw, &[]), Err(Error::ContentPolicy)));
    }

    #[test]
    fn test_undecodable_attachment_skipped() {
        let raw = b"Content-Type: multipart/mixed; boundary=mix\r\n\
\r\n\
--mix\r\n\
\r\n\
body\r\n\
--mix\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=bad.pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
!!!not base64!!!\r\n\
--mix--\r\n";
        let message = transform(raw, &[]).unwrap();
        assert_eq!(message.body.content, "body");
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(transform(b"", &[]), Err(Error::Parse(_))));
        assert!(matches!(
            transform(b"Content-Type: multipart/mixed\r\n\r\nbody", &[]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_attachments_serialize_as_array() {
        let message = transform(b"Subject: x\r\n\r\ntext", &[]).unwrap();
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["attachments"], serde_json::json!([]));
    }
}
