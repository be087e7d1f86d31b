//! `GraphClient` against local token and `sendMail` endpoints.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use graphrelay_core::graph::{BodyType, GraphMessage, ItemBody, Recipient};
use graphrelay_core::{DeliveryError, GraphClient, MailSender, RetryPolicy, SendMailRequest};
use graphrelay_oauth::{ClientCredentialsFlow, OAuthClient, Provider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const TOKEN: &str = r#"{"token_type":"Bearer","expires_in":3599,"access_token":"graph-token"}"#;

/// Answers each accepted connection with the next canned response and
/// returns every raw request.
async fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let root = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        }
        requests
    });

    (root, handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request);
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .find_map(|l| {
                    l.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            if request.len() >= split + 4 + length {
                break;
            }
        }
        if n == 0 {
            break;
        }
    }
    String::from_utf8_lossy(&request).into_owned()
}

fn client(token_root: &str, graph_root: &str) -> GraphClient {
    let provider = Provider::microsoft("tenant")
        .unwrap()
        .with_token_url(format!("{token_root}/tenant/oauth2/v2.0/token"))
        .unwrap();
    let oauth = OAuthClient::new("app-id", provider)
        .unwrap()
        .with_client_secret("s3cret");
    GraphClient::new(ClientCredentialsFlow::new(oauth))
        .unwrap()
        .with_base_url(&format!("{graph_root}/v1.0"))
        .unwrap()
}

fn request() -> SendMailRequest {
    SendMailRequest::new(GraphMessage {
        subject: "Nightly report".to_string(),
        body: ItemBody {
            content_type: BodyType::Text,
            content: "All jobs finished.".to_string(),
        },
        to_recipients: vec![Recipient::new("ops@contoso.com")],
        cc_recipients: Vec::new(),
        bcc_recipients: Vec::new(),
        attachments: Vec::new(),
    })
}

#[tokio::test]
async fn test_send_mail_posts_json_with_bearer_token() {
    let (token_root, tokens) = serve(vec![("200 OK", TOKEN)]).await;
    let (graph_root, graph) = serve(vec![("202 Accepted", "")]).await;

    client(&token_root, &graph_root)
        .send_mail("scanner@contoso.com", &request())
        .await
        .unwrap();

    let token_request = &tokens.await.unwrap()[0];
    assert!(token_request.contains("grant_type=client_credentials"));

    let post = &graph.await.unwrap()[0];
    assert!(post.starts_with("POST /v1.0/users/scanner@contoso.com/sendMail HTTP/1.1"));
    assert!(post.to_ascii_lowercase().contains("authorization: bearer graph-token"));
    assert!(post.contains(r#""saveToSentItems":false"#));
    assert!(post.contains(r#""subject":"Nightly report""#));
    assert!(post.contains(r#""contentType":"Text""#));
    assert!(post.contains(r#""attachments":[]"#));
}

#[tokio::test]
async fn test_non_accepted_status_is_rejected() {
    let (token_root, _tokens) = serve(vec![("200 OK", TOKEN)]).await;
    let (graph_root, _graph) = serve(vec![(
        "200 OK",
        r#"{"error":{"code":"ErrorInvalidRecipients","message":"bad"}}"#,
    )])
    .await;

    let err = client(&token_root, &graph_root)
        .send_mail("scanner@contoso.com", &request())
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert!(matches!(err, DeliveryError::Rejected { status: 200, .. }));
}

#[tokio::test]
async fn test_token_failure_surfaces_as_auth_error() {
    let (token_root, _tokens) = serve(vec![(
        "401 Unauthorized",
        r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret."}"#,
    )])
    .await;

    let err = client(&token_root, "http://127.0.0.1:9")
        .send_mail("scanner@contoso.com", &request())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Auth(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_stale_mailbox_is_retried_until_accepted() {
    let (token_root, tokens) = serve(vec![("200 OK", TOKEN), ("200 OK", TOKEN)]).await;
    let (graph_root, graph) = serve(vec![
        (
            "503 Service Unavailable",
            r#"{"error":{"code":"MailboxInfoStale","message":"Mailbox info is stale."}}"#,
        ),
        ("202 Accepted", ""),
    ])
    .await;

    let policy = RetryPolicy::new(3, Duration::from_millis(10));
    policy
        .send(&client(&token_root, &graph_root), "scanner@contoso.com", &request())
        .await
        .unwrap();

    assert_eq!(tokens.await.unwrap().len(), 2);
    assert_eq!(graph.await.unwrap().len(), 2);
}
