//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use thinking_proxy::{ProxyConfig, ProxyServer};

/// Read one request (head plus Content-Length body) from a socket.
pub async fn read_http_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(head_end) = find_separator(&buf) {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + content_length {
                return buf;
            }
        }
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Index just past the first `\r\n\r\n`.
pub fn find_separator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Split a raw HTTP message into (head, body).
pub fn split_message(raw: &[u8]) -> (String, Vec<u8>) {
    let end = find_separator(raw).expect("no header separator");
    (
        String::from_utf8_lossy(&raw[..end]).into_owned(),
        raw[end..].to_vec(),
    )
}

/// Start a backend that answers with the exact request bytes it received.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let received = read_http_request(&mut socket).await;
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            received.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&received).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that replies with `response` verbatim, written in small
/// pieces to exercise partial reads.
pub async fn start_raw_backend(response: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = std::sync::Arc::new(response);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let response = response.clone();
                    tokio::spawn(async move {
                        read_http_request(&mut socket).await;
                        for piece in response.chunks(10_007) {
                            if socket.write_all(piece).await.is_err() {
                                return;
                            }
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that reads a little of the request, answers with `reply`
/// and drops the socket without draining the rest.
pub async fn start_early_reply_backend(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut first = [0u8; 1024];
                let _ = socket.read(&mut first).await;
                let _ = socket.write_all(reply).await;
            });
        }
    });

    addr
}

/// Start a backend that reads the request, writes `prefix` and then holds
/// the connection open without sending anything else.
pub async fn start_stalled_backend(prefix: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_http_request(&mut socket).await;
                let _ = socket.write_all(prefix).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    addr
}

/// An address with nothing listening on it.
pub fn unused_addr() -> SocketAddr {
    let vacant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    vacant.local_addr().unwrap()
}

/// Start a proxy on an ephemeral port in front of `backend`.
pub async fn start_proxy(backend: SocketAddr) -> (ProxyServer, SocketAddr) {
    start_proxy_with(backend, |_| {}).await
}

/// Like [`start_proxy`], with a hook to adjust the configuration first.
pub async fn start_proxy_with(
    backend: SocketAddr,
    configure: impl FnOnce(&mut ProxyConfig),
) -> (ProxyServer, SocketAddr) {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backend.address = backend.to_string();
    configure(&mut config);
    let server = ProxyServer::new(config);
    let addr = server.start().await.unwrap();
    (server, addr)
}

/// Send raw bytes and collect everything until the proxy closes.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    out
}
