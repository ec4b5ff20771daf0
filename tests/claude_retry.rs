// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retry behaviour of the Claude adapter against a scripted HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use coderev::llm::{ClaudeClient, RateLimiter};
use coderev::types::{ChatRequest, ClientConfig, LlmClient, Message};

const RATE_LIMIT_BODY: &str =
    r#"{"error":{"type":"rate_limit_error","message":"Too many requests"}}"#;

const OK_BODY: &str = r#"{"content":[{"type":"text","text":"Looks good."}],"model":"claude-test","stop_reason":"end_turn","usage":{"input_tokens":3,"output_tokens":2}}"#;

fn http_response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    )
}

/// Serve scripted responses: 429 for the first `failures` requests, then
/// 200. Returns the base URL and a request counter.
async fn scripted_server(failures: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);

            // Drain the request head; the client closes after our reply.
            let mut buffer = [0u8; 8192];
            let _ = socket.read(&mut buffer).await;

            let response = if n < failures {
                http_response("429 Too Many Requests", RATE_LIMIT_BODY)
            } else {
                http_response("200 OK", OK_BODY)
            };
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), requests)
}

#[tokio::test]
async fn retries_twice_on_429_then_succeeds() {
    let (base_url, requests) = scripted_server(2).await;

    let config = ClientConfig {
        api_key: Some("test-key".to_string()),
        model: Some("claude-test".to_string()),
        base_url: Some(base_url),
        max_retries: Some(3),
        ..Default::default()
    };
    let client = ClaudeClient::new(&config, Arc::new(RateLimiter::unlimited())).unwrap();

    let request = ChatRequest::new(vec![Message::user("review this")]);
    let response = client.generate_chat(&request).await.unwrap();

    // Two 429s, then the successful attempt; backoff happened in between.
    assert_eq!(requests.load(Ordering::SeqCst), 3);
    assert_eq!(response.content, "Looks good.");
    assert_eq!(response.model, "claude-test");
    assert!(response.completed);
}

#[tokio::test]
async fn exhausted_retries_surface_rate_limit() {
    let (base_url, requests) = scripted_server(usize::MAX).await;

    let config = ClientConfig {
        api_key: Some("test-key".to_string()),
        model: Some("claude-test".to_string()),
        base_url: Some(base_url),
        max_retries: Some(1),
        ..Default::default()
    };
    let client = ClaudeClient::new(&config, Arc::new(RateLimiter::unlimited())).unwrap();

    let request = ChatRequest::new(vec![Message::user("review this")]);
    let err = client.generate_chat(&request).await.unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}
