//! Full SMTP conversations relayed into a recording mail sink.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio_util::sync::CancellationToken;

use graphrelay_core::graph::{BodyType, Recipient};
use graphrelay_core::{DeliveryError, MailSender, RelayBackend, SendMailRequest, TransactionStore};
use graphrelay_smtp::{Server, ServerConfig};

/// Records every request; optionally rejects them all.
#[derive(Clone, Default)]
struct Sink {
    sent: Arc<Mutex<Vec<(String, SendMailRequest)>>>,
    reject: Option<u16>,
}

impl Sink {
    fn sent(&self) -> Vec<(String, SendMailRequest)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailSender for Sink {
    async fn send_mail(&self, mailbox: &str, request: &SendMailRequest) -> Result<(), DeliveryError> {
        if let Some(status) = self.reject {
            return Err(DeliveryError::rejected(
                status,
                r#"{"error":{"code":"ErrorAccessDenied","message":"Access is denied."}}"#,
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((mailbox.to_string(), request.clone()));
        Ok(())
    }
}

async fn relay(sink: Sink, store: Arc<TransactionStore>, script: &str) -> String {
    let backend = RelayBackend::new(store, sink);
    let server = Server::new(backend, ServerConfig::new("relay.test"));
    let (mut client, transport) = duplex(1 << 16);
    let task = tokio::spawn(async move {
        server.handle(transport, None, CancellationToken::new()).await;
    });

    client.write_all(script.as_bytes()).await.unwrap();
    client.shutdown().await.unwrap();
    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap();
    out
}

fn addresses(recipients: &[Recipient]) -> Vec<&str> {
    recipients
        .iter()
        .map(|r| r.email_address.address.as_str())
        .collect()
}

#[tokio::test]
async fn test_full_transaction_is_delivered_at_quit() {
    let sink = Sink::default();
    let store = Arc::new(TransactionStore::new());
    let script = "EHLO legacy-app\r\n\
                  AUTH PLAIN AHVzZXIAcGFzcw==\r\n\
                  MAIL FROM:<printer@contoso.com>\r\n\
                  RCPT TO:<alice@contoso.com>\r\n\
                  RCPT TO:<audit@contoso.com>\r\n\
                  RCPT TO:<ALICE@contoso.com>\r\n\
                  DATA\r\n\
                  From: Printer <printer@contoso.com>\r\n\
                  To: Alice <alice@contoso.com>\r\n\
                  Subject: Scan ready\r\n\
                  \r\n\
                  Your scan is attached.\r\n\
                  .\r\n\
                  QUIT\r\n";

    let out = relay(sink.clone(), Arc::clone(&store), script).await;

    assert!(out.contains("235 "));
    assert!(out.ends_with("221 2.0.0 Bye\r\n"));
    assert!(store.is_empty());

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    let (mailbox, request) = &sent[0];
    assert_eq!(mailbox, "printer@contoso.com");
    assert!(!request.save_to_sent_items);
    assert_eq!(request.message.subject, "Scan ready");
    assert_eq!(request.message.body.content_type, BodyType::Text);
    assert_eq!(request.message.body.content, "Your scan is attached.\r\n");
    assert_eq!(addresses(&request.message.to_recipients), ["alice@contoso.com"]);
    assert!(request.message.cc_recipients.is_empty());
    assert_eq!(addresses(&request.message.bcc_recipients), ["audit@contoso.com"]);
    assert!(request.message.attachments.is_empty());
}

#[tokio::test]
async fn test_sequential_transactions_delivered_in_order() {
    let sink = Sink::default();
    let store = Arc::new(TransactionStore::new());
    let script = "HELO app\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  DATA\r\n\
                  Subject: same\r\n\r\nfirst\r\n.\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  DATA\r\n\
                  Subject: same\r\n\r\nsecond\r\n.\r\n\
                  QUIT\r\n";

    let out = relay(sink.clone(), Arc::clone(&store), script).await;

    assert!(out.ends_with("221 2.0.0 Bye\r\n"));
    let bodies: Vec<String> = sink
        .sent()
        .into_iter()
        .map(|(_, request)| request.message.body.content)
        .collect();
    assert_eq!(bodies, ["first\r\n", "second\r\n"]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_rset_drops_pending_transaction() {
    let sink = Sink::default();
    let store = Arc::new(TransactionStore::new());
    let script = "HELO app\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  RSET\r\n\
                  QUIT\r\n";

    let out = relay(sink.clone(), Arc::clone(&store), script).await;

    assert!(out.ends_with("221 2.0.0 Bye\r\n"));
    assert!(sink.sent().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_rset_after_data_discards_message() {
    let sink = Sink::default();
    let store = Arc::new(TransactionStore::new());
    let script = "HELO app\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  DATA\r\n\
                  Subject: Hi\r\n\r\nnever mind\r\n.\r\n\
                  RSET\r\n\
                  QUIT\r\n";

    let out = relay(sink.clone(), Arc::clone(&store), script).await;

    assert!(out.contains("250 2.0.0 Reset OK\r\n"));
    assert!(out.ends_with("221 2.0.0 Bye\r\n"));
    assert!(sink.sent().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_rejected_delivery_replaces_closing_reply() {
    let sink = Sink {
        reject: Some(403),
        ..Sink::default()
    };
    let store = Arc::new(TransactionStore::new());
    let script = "HELO app\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  DATA\r\n\
                  Subject: denied\r\n\r\nbody\r\n.\r\n\
                  QUIT\r\n";

    let out = relay(sink, Arc::clone(&store), script).await;

    assert!(out.ends_with("554 5.0.0 Delivery rejected\r\n"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_message_without_body_fails_at_quit() {
    let sink = Sink::default();
    let store = Arc::new(TransactionStore::new());
    let script = "HELO app\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  DATA\r\n\
                  Subject: only a file\r\n\
                  Content-Type: multipart/mixed; boundary=b\r\n\
                  \r\n\
                  --b\r\n\
                  Content-Type: application/pdf\r\n\
                  Content-Disposition: attachment; filename=a.pdf\r\n\
                  \r\n\
                  %PDF-\r\n\
                  --b--\r\n\
                  .\r\n\
                  QUIT\r\n";

    let out = relay(sink.clone(), Arc::clone(&store), script).await;

    assert!(out.ends_with("554 5.6.0 Message has no body\r\n"));
    assert!(sink.sent().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_disconnect_mid_data_leaves_row_for_reclaimer() {
    let sink = Sink::default();
    let store = Arc::new(TransactionStore::new());
    let script = "HELO app\r\n\
                  MAIL FROM:<a@contoso.com>\r\n\
                  RCPT TO:<x@contoso.com>\r\n\
                  DATA\r\n\
                  Subject: cut off\r\n";

    relay(sink.clone(), Arc::clone(&store), script).await;

    assert!(sink.sent().is_empty());
    assert_eq!(store.len(), 1);
}
