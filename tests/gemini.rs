//! Wire-level tests for [`GeminiClient`] against a loopback HTTP responder.
//!
//! The responder answers each connection with one canned response and hands
//! back what it received, so the request line, key placement and body shape
//! can be asserted without reaching the real service.

mod common;

use common::build_zip;
use edgequake_news2csv::{
    process_archive, ExtractionConfig, GeminiClient, ImageError, InferenceBackend, InferenceError,
    InlineImage,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ── Loopback responder ───────────────────────────────────────────────────────

#[derive(Debug)]
struct Captured {
    request_line: String,
    body: serde_json::Value,
}

/// Serve `responses` in order, one per connection, then stop.
async fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Captured>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/v1", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for (status, body) in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let (head, raw_body) = read_request(&mut sock).await;
            captured.push(Captured {
                request_line: head.lines().next().unwrap_or_default().to_string(),
                body: serde_json::from_slice(&raw_body).unwrap_or(serde_json::Value::Null),
            });
            let reply = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        }
        captured
    });

    (base, handle)
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = sock.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    (head, buf[header_end..].to_vec())
}

fn candidate(text: &str) -> String {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
    })
    .to_string()
}

fn png() -> InlineImage {
    InlineImage {
        mime_type: "image/png".into(),
        data: "cGFnZQ==".into(),
    }
}

fn client(base: &str) -> GeminiClient {
    GeminiClient::new(base, "gemini-1.5-flash", "test-key", Some(Duration::from_secs(10))).unwrap()
}

// ── Single calls ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_posts_instruction_and_image() {
    let (base, server) = serve(vec![(200, candidate("[]"))]).await;

    let text = client(&base).send(&png(), "Extract articles.").await.unwrap();
    assert_eq!(text, "[]");

    let captured = server.await.unwrap();
    assert_eq!(
        captured[0].request_line,
        "POST /v1/models/gemini-1.5-flash:generateContent?key=test-key HTTP/1.1"
    );
    assert_eq!(
        captured[0].body,
        serde_json::json!({
            "contents": [{
                "parts": [
                    {"text": "Extract articles."},
                    {"inline_data": {"mime_type": "image/png", "data": "cGFnZQ=="}}
                ]
            }]
        })
    );
}

#[tokio::test]
async fn test_non_success_status_keeps_body() {
    let body = r#"{"error":{"code":429,"message":"quota"}}"#.to_string();
    let (base, _server) = serve(vec![(429, body.clone())]).await;

    let err = client(&base).send(&png(), "x").await.unwrap_err();
    match err {
        InferenceError::Status { status, body: got } => {
            assert_eq!(status, 429);
            assert_eq!(got, body);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_success_without_candidates_is_envelope_error() {
    let (base, _server) = serve(vec![(200, r#"{"promptFeedback":{"blockReason":"OTHER"}}"#.into())]).await;
    let err = client(&base).send(&png(), "x").await.unwrap_err();
    assert!(matches!(err, InferenceError::Envelope(_)), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}/v1"))
        .send(&png(), "x")
        .await
        .unwrap_err();
    match err {
        InferenceError::Transport(msg) => assert!(!msg.contains("test-key"), "key leaked: {msg}"),
        other => panic!("unexpected: {other:?}"),
    }
}

// ── Through the pipeline ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pipeline_with_gemini_client() {
    common::init_tracing();
    let page_one = "```json\n[{\"title\":\"Rates held\",\"points\":[\"a\",\"b\"],\"glossary\":{\"repo\":\"lending rate\"}}]\n```";
    let (base, server) = serve(vec![
        (200, candidate(page_one)),
        (500, "internal".into()),
        (200, candidate("[{\"title\":\"Late edition\"}]")),
    ])
    .await;

    let dir = tempfile::TempDir::new().unwrap();
    let config = ExtractionConfig::builder()
        .uploads_dir(dir.path())
        .endpoint(base)
        .api_key("test-key")
        .api_timeout_secs(10)
        .build()
        .unwrap();

    let zip = build_zip(&[("1.png", b"one"), ("2.jpg", b"two"), ("3.png", b"three")]);
    let report = process_archive(zip, "gem.zip", &config).await.unwrap();

    assert_eq!(report.stats.succeeded_images, 2);
    assert!(matches!(
        report.images[1].error,
        Some(ImageError::ServiceError { status: Some(500), .. })
    ));
    assert_eq!(report.images[0].article_ids, vec![1]);
    assert_eq!(report.images[2].article_ids, vec![2]);

    let captured = server.await.unwrap();
    assert_eq!(captured.len(), 3);
    assert_eq!(
        captured[1].body["contents"][0]["parts"][1]["inline_data"]["mime_type"],
        "image/jpeg"
    );
}
