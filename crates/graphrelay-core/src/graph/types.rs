//! Microsoft Graph `sendMail` payload types.

use serde::{Deserialize, Serialize};

/// `@odata.type` of a file attachment.
pub const FILE_ATTACHMENT_TYPE: &str = "#microsoft.graph.fileAttachment";

/// Request body for `POST /users/{id}/sendMail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailRequest {
    /// Message to send.
    pub message: GraphMessage,
    /// Whether Graph keeps a copy in the sender's Sent Items.
    pub save_to_sent_items: bool,
}

impl SendMailRequest {
    /// Wraps a message without saving a copy to Sent Items.
    #[must_use]
    pub const fn new(message: GraphMessage) -> Self {
        Self {
            message,
            save_to_sent_items: false,
        }
    }
}

/// Graph message resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: ItemBody,
    /// `To` recipients.
    pub to_recipients: Vec<Recipient>,
    /// `Cc` recipients.
    pub cc_recipients: Vec<Recipient>,
    /// `Bcc` recipients.
    pub bcc_recipients: Vec<Recipient>,
    /// File attachments; serialized as `[]` when empty.
    pub attachments: Vec<FileAttachment>,
}

/// Message body with its content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    /// `Text` or `HTML`.
    pub content_type: BodyType,
    /// Body content.
    pub content: String,
}

/// Body content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Plain text.
    #[serde(rename = "Text")]
    Text,
    /// HTML.
    #[serde(rename = "HTML")]
    Html,
}

/// A message recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// Recipient address.
    pub email_address: EmailAddress,
}

impl Recipient {
    /// Creates a recipient from a bare address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            email_address: EmailAddress {
                address: address.into(),
            },
        }
    }
}

/// Email address resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Bare address.
    pub address: String,
}

/// `#microsoft.graph.fileAttachment` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Always [`FILE_ATTACHMENT_TYPE`].
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    /// File name.
    pub name: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    /// Base64-encoded content.
    pub content_bytes: String,
}

impl FileAttachment {
    /// Creates a file attachment from already-encoded content.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        content_bytes: impl Into<String>,
    ) -> Self {
        Self {
            odata_type: FILE_ATTACHMENT_TYPE.to_string(),
            name: name.into(),
            content_type: content_type.into(),
            content_bytes: content_bytes.into(),
        }
    }
}

/// Graph error response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Graph error details.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub code: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_mail_request_shape() {
        let request = SendMailRequest::new(GraphMessage {
            subject: "Report".to_string(),
            body: ItemBody {
                content_type: BodyType::Html,
                content: "<p>hi</p>".to_string(),
            },
            to_recipients: vec![Recipient::new("a@example.com")],
            cc_recipients: vec![],
            bcc_recipients: vec![Recipient::new("b@example.com")],
            attachments: vec![FileAttachment::new("r.pdf", "application/pdf", "JVBERi0=")],
        });

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "message": {
                    "subject": "Report",
                    "body": {"contentType": "HTML", "content": "<p>hi</p>"},
                    "toRecipients": [{"emailAddress": {"address": "a@example.com"}}],
                    "ccRecipients": [],
                    "bccRecipients": [{"emailAddress": {"address": "b@example.com"}}],
                    "attachments": [{
                        "@odata.type": "#microsoft.graph.fileAttachment",
                        "name": "r.pdf",
                        "contentType": "application/pdf",
                        "contentBytes": "JVBERi0="
                    }]
                },
                "saveToSentItems": false
            })
        );
    }

    #[test]
    fn test_error_response() {
        let body = r#"{"error":{"code":"ErrorMailboxInfoStale","message":"retry"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.code, "ErrorMailboxInfoStale");
    }
}
