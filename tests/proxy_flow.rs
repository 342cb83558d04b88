//! End-to-end request handling through a live proxy.

use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn thinking_suffix_is_rewritten_before_forwarding() {
    let backend = common::start_echo_backend().await;
    let (server, proxy) = common::start_proxy(backend).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .post(format!("http://{}/v1/messages", proxy))
        .header("X-Api-Key", "dummy")
        .json(&json!({
            "model": "claude-sonnet-4-thinking-5000",
            "messages": [{"role": "user", "content": "hello"}],
            "stream": false
        }))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 200);
    let echoed = res.bytes().await.unwrap();
    let (head, body) = common::split_message(&echoed);

    assert!(head.starts_with("POST /v1/messages HTTP/1.1\r\n"));
    assert!(head.contains(&format!("Host: {}\r\n", backend)));
    assert!(head.contains("Connection: close\r\n"));
    assert!(head.contains(&format!("Content-Length: {}\r\n", body.len())));
    assert!(head.to_ascii_lowercase().contains("x-api-key: dummy\r\n"));

    let forwarded: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(forwarded["model"], "claude-sonnet-4");
    assert_eq!(forwarded["thinking"]["type"], "enabled");
    assert_eq!(forwarded["thinking"]["budget_tokens"], 5000);
    assert_eq!(forwarded["max_tokens"], 6024);
    assert_eq!(forwarded["messages"][0]["content"], "hello");

    server.stop().await;
}

#[tokio::test]
async fn clamped_budget_respects_hard_cap() {
    let backend = common::start_echo_backend().await;
    let (server, proxy) = common::start_proxy(backend).await;

    let body = br#"{"model":"claude-opus-4-thinking-40000","max_tokens":1000}"#;
    let request = format!(
        "POST /v1/messages HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut raw = request.into_bytes();
    raw.extend_from_slice(body);

    let response = common::send_raw(proxy, &raw).await;
    let (_, echoed) = common::split_message(&response);
    let (_, forwarded) = common::split_message(&echoed);
    let forwarded: Value = serde_json::from_slice(&forwarded).unwrap();

    assert_eq!(forwarded["model"], "claude-opus-4");
    assert_eq!(forwarded["thinking"]["budget_tokens"], 31_999);
    assert_eq!(forwarded["max_tokens"], 32_000);

    server.stop().await;
}

#[tokio::test]
async fn plain_requests_pass_through_untouched() {
    let backend = common::start_echo_backend().await;
    let (server, proxy) = common::start_proxy(backend).await;

    let body = br#"{ "model": "claude-sonnet-4", "max_tokens": 5 }"#;
    let mut raw = format!(
        "POST /v1/messages HTTP/1.1\r\nHost: localhost:8317\r\nX-Custom-Header: Mixed-Case\r\nConnection: keep-alive\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);

    let response = common::send_raw(proxy, &raw).await;
    let (_, echoed) = common::split_message(&response);
    let (head, forwarded) = common::split_message(&echoed);

    assert_eq!(forwarded, body.to_vec());
    assert!(head.contains("X-Custom-Header: Mixed-Case\r\n"));
    assert!(head.contains("Connection: keep-alive\r\n"));
    assert!(!head.contains("Connection: close"));
    assert!(!head.contains("localhost:8317"));

    server.stop().await;
}

#[tokio::test]
async fn get_requests_are_forwarded() {
    let backend = common::start_echo_backend().await;
    let (server, proxy) = common::start_proxy(backend).await;

    let response = common::send_raw(
        proxy,
        b"GET /v1/models?model=claude-x-thinking-10 HTTP/1.1\r\nHost: localhost\r\n\r\n",
    )
    .await;
    let (head, echoed) = common::split_message(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(echoed.starts_with(b"GET /v1/models?model=claude-x-thinking-10 HTTP/1.1\r\n"));

    server.stop().await;
}

#[tokio::test]
async fn garbage_gets_exactly_one_bad_request() {
    let backend = common::start_echo_backend().await;
    let (server, proxy) = common::start_proxy(backend).await;

    let response = common::send_raw(proxy, b"\x16\x03\x01 definitely not http\r\n\r\n").await;
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(text.matches("HTTP/1.1").count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn unreachable_backend_gets_bad_gateway() {
    let (server, proxy) = common::start_proxy(common::unused_addr()).await;

    let response = common::send_raw(
        proxy,
        b"POST /v1/messages HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}",
    )
    .await;
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
    assert_eq!(text.matches("HTTP/1.1").count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn large_binary_response_is_relayed_verbatim() {
    // Deterministic pseudo-random bytes standing in for a gzip body.
    let mut state = 0x2545_f491_u32;
    let payload: Vec<u8> = (0..1_500_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();

    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    response.extend_from_slice(&payload);

    let backend = common::start_raw_backend(response.clone()).await;
    let (server, proxy) = common::start_proxy(backend).await;

    let received = common::send_raw(
        proxy,
        b"POST /v1/messages HTTP/1.1\r\nContent-Length: 38\r\n\r\n{\"model\":\"claude-x-thinking-1024\"}    ",
    )
    .await;

    assert_eq!(received.len(), response.len());
    assert!(received == response, "relayed bytes differ from backend bytes");

    server.stop().await;
}

#[tokio::test]
async fn early_backend_reply_is_relayed_instead_of_bad_gateway() {
    let reply: &[u8] =
        b"HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    let backend = common::start_early_reply_backend(reply).await;
    let (server, proxy) = common::start_proxy(backend).await;

    let body = vec![b'a'; 8 * 1024 * 1024];
    let mut raw = format!(
        "POST /v1/upload HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(&body);

    let response = common::send_raw(proxy, &raw).await;
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "got {text:?}");
    assert!(!text.contains("502"));

    server.stop().await;
}
