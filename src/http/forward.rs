//! Forwarding to the backend and streaming its response back.
//!
//! # Responsibilities
//! - Rebuild the request head with fresh Host / Content-Length framing
//! - Connect to the backend and send head plus (possibly rewritten) body
//! - Relay the backend response to the client one chunk at a time
//!
//! # Design Decisions
//! - Response bytes are opaque: no parsing, no decompression
//! - At most one chunk per connection is held in memory
//! - No retries; the first failure tears both legs down

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::http::request::IncomingRequest;
use crate::resilience::timeouts::{deadline, with_deadline};
use crate::rewrite::RewriteResult;

/// Headers recomputed by the proxy rather than copied from the client.
const REFRAMED_HEADERS: [&str; 3] = ["content-length", "host", "transfer-encoding"];

/// Errors on the backend leg or while relaying to the client.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("backend connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("sending request to backend failed: {0}")]
    Send(#[source] io::Error),

    #[error("backend closed without sending a response")]
    EmptyResponse,

    #[error("reading from backend failed after {relayed} bytes: {source}")]
    BackendRead {
        relayed: u64,
        #[source]
        source: io::Error,
    },

    #[error("backend idle for {limit:?} after {relayed} bytes")]
    RelayIdle { relayed: u64, limit: Duration },

    #[error("writing to client failed after {relayed} bytes: {source}")]
    ClientWrite {
        relayed: u64,
        #[source]
        source: io::Error,
    },
}

impl ForwardError {
    /// A 502 is only possible while nothing has reached the client yet.
    pub fn should_reply_bad_gateway(&self) -> bool {
        match self {
            ForwardError::Connect(_)
            | ForwardError::ConnectTimeout(_)
            | ForwardError::Send(_)
            | ForwardError::EmptyResponse => true,
            ForwardError::BackendRead { relayed, .. } | ForwardError::RelayIdle { relayed, .. } => {
                *relayed == 0
            }
            ForwardError::ClientWrite { .. } => false,
        }
    }
}

/// Sends requests to the fixed backend and relays responses.
#[derive(Debug, Clone)]
pub struct Forwarder {
    backend_address: String,
    connect_timeout: Option<Duration>,
    relay_idle: Option<Duration>,
    chunk_size: usize,
}

impl Forwarder {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            backend_address: config.backend.address.clone(),
            connect_timeout: deadline(config.timeouts.connect_secs),
            relay_idle: deadline(config.timeouts.relay_idle_secs),
            chunk_size: config.limits.relay_chunk_size,
        }
    }

    pub async fn connect(&self) -> Result<TcpStream, ForwardError> {
        let stream = with_deadline(self.connect_timeout, TcpStream::connect(&self.backend_address))
            .await
            .map_err(|e| ForwardError::ConnectTimeout(e.0))?
            .map_err(ForwardError::Connect)?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Write the rebuilt head and the body to the backend.
    pub async fn send<W>(
        &self,
        backend: &mut W,
        request: &IncomingRequest,
        rewrite: &RewriteResult,
    ) -> Result<(), ForwardError>
    where
        W: AsyncWrite + Unpin,
    {
        let head = build_head(request, rewrite, &self.backend_address);
        backend.write_all(&head).await.map_err(ForwardError::Send)?;
        backend
            .write_all(&rewrite.body)
            .await
            .map_err(ForwardError::Send)?;
        backend.flush().await.map_err(ForwardError::Send)
    }

    /// Send the request and relay whatever the backend answers.
    ///
    /// A backend may reply and stop reading before the body is fully sent,
    /// e.g. a 413 on a large upload. That reply still reaches the client; the
    /// send error only surfaces when the backend has nothing to say.
    pub async fn exchange<B, C>(
        &self,
        backend: &mut B,
        client: &mut C,
        request: &IncomingRequest,
        rewrite: &RewriteResult,
    ) -> Result<u64, ForwardError>
    where
        B: AsyncRead + AsyncWrite + Unpin,
        C: AsyncWrite + Unpin,
    {
        let sent = self.send(backend, request, rewrite).await;
        let Err(send_error) = sent else {
            return self.relay(backend, client).await;
        };

        tracing::debug!(error = %send_error, "Backend stopped reading, relaying its early reply");
        match self.relay(backend, client).await {
            Err(ForwardError::EmptyResponse) => Err(send_error),
            Err(e) if e.should_reply_bad_gateway() => Err(send_error),
            other => other,
        }
    }

    /// Copy the backend response to the client until the backend closes.
    ///
    /// Returns the number of bytes relayed.
    pub async fn relay<R, W>(&self, backend: &mut R, client: &mut W) -> Result<u64, ForwardError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut relayed = 0u64;

        loop {
            let n = match with_deadline(self.relay_idle, backend.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(source)) => return Err(ForwardError::BackendRead { relayed, source }),
                Err(elapsed) => {
                    return Err(ForwardError::RelayIdle {
                        relayed,
                        limit: elapsed.0,
                    })
                }
            };
            if n == 0 {
                break;
            }

            client
                .write_all(&buf[..n])
                .await
                .map_err(|source| ForwardError::ClientWrite { relayed, source })?;
            relayed += n as u64;
            tracing::trace!(chunk = n, relayed, "Relayed response chunk");
        }

        if relayed == 0 {
            return Err(ForwardError::EmptyResponse);
        }
        client
            .flush()
            .await
            .map_err(|source| ForwardError::ClientWrite { relayed, source })?;
        Ok(relayed)
    }
}

/// Rebuild the request head for the backend.
///
/// Client headers keep their order and casing. Content-Length, Host and
/// Transfer-Encoding are replaced; a transformed body also replaces any
/// Connection header with `Connection: close`.
pub fn build_head(request: &IncomingRequest, rewrite: &RewriteResult, host: &str) -> Vec<u8> {
    let mut head = Vec::with_capacity(512);
    head.extend_from_slice(request.method.as_bytes());
    head.push(b' ');
    head.extend_from_slice(request.path.as_bytes());
    head.push(b' ');
    head.extend_from_slice(request.version.as_bytes());
    head.extend_from_slice(b"\r\n");

    for (name, value) in request.headers.iter() {
        let reframed = REFRAMED_HEADERS
            .iter()
            .any(|h| name.eq_ignore_ascii_case(h));
        let replaced_connection = rewrite.transformed && name.eq_ignore_ascii_case("connection");
        if reframed || replaced_connection {
            continue;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value);
        head.extend_from_slice(b"\r\n");
    }

    head.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    if rewrite.transformed {
        head.extend_from_slice(b"Connection: close\r\n");
    }
    head.extend_from_slice(format!("Content-Length: {}\r\n\r\n", rewrite.body.len()).as_bytes());
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Headers;
    use bytes::Bytes;

    fn request(headers: &[(&str, &str)], body: &'static [u8]) -> IncomingRequest {
        let mut h = Headers::new();
        for (name, value) in headers {
            h.push(*name, Bytes::copy_from_slice(value.as_bytes()));
        }
        IncomingRequest {
            method: "POST".into(),
            path: "/v1/messages?beta=true".into(),
            version: "HTTP/1.1".into(),
            headers: h,
            body: Bytes::from_static(body),
        }
    }

    fn rewrite(body: &'static [u8], transformed: bool) -> RewriteResult {
        RewriteResult {
            body: Bytes::from_static(body),
            transformed,
            directive: None,
        }
    }

    fn forwarder(chunk_size: usize) -> Forwarder {
        let mut config = ProxyConfig::default();
        config.limits.relay_chunk_size = chunk_size;
        Forwarder::new(&config)
    }

    #[test]
    fn untransformed_head_keeps_client_headers() {
        let req = request(
            &[
                ("Host", "localhost:8317"),
                ("X-Api-Key", "secret"),
                ("connection", "keep-alive"),
                ("Content-Length", "4"),
                ("Transfer-Encoding", "identity"),
            ],
            b"body",
        );
        let head = build_head(&req, &rewrite(b"body", false), "127.0.0.1:8318");

        assert_eq!(
            String::from_utf8(head).unwrap(),
            "POST /v1/messages?beta=true HTTP/1.1\r\n\
             X-Api-Key: secret\r\n\
             connection: keep-alive\r\n\
             Host: 127.0.0.1:8318\r\n\
             Content-Length: 4\r\n\r\n"
        );
    }

    #[test]
    fn transformed_head_closes_and_reframes() {
        let req = request(
            &[("content-length", "2"), ("Connection", "keep-alive"), ("Accept", "*/*")],
            b"{}",
        );
        let head = build_head(&req, &rewrite(b"{\"model\":\"claude-x\"}", true), "127.0.0.1:8318");

        assert_eq!(
            String::from_utf8(head).unwrap(),
            "POST /v1/messages?beta=true HTTP/1.1\r\n\
             Accept: */*\r\n\
             Host: 127.0.0.1:8318\r\n\
             Connection: close\r\n\
             Content-Length: 20\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn relay_copies_across_chunk_boundaries() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (mut backend_tx, mut backend_rx) = tokio::io::duplex(512);
        let (mut client_tx, mut client_rx) = tokio::io::duplex(512);

        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            backend_tx.write_all(&payload).await.unwrap();
        });
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            client_rx.read_to_end(&mut out).await.unwrap();
            out
        });

        let relayed = forwarder(100)
            .relay(&mut backend_rx, &mut client_tx)
            .await
            .unwrap();
        drop(client_tx);
        writer.await.unwrap();

        assert_eq!(relayed, 10_000);
        assert_eq!(reader.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn empty_backend_response_is_bad_gateway() {
        let (backend_tx, mut backend_rx) = tokio::io::duplex(64);
        drop(backend_tx);
        let mut client = Vec::new();

        let err = forwarder(64)
            .relay(&mut backend_rx, &mut client)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::EmptyResponse));
        assert!(err.should_reply_bad_gateway());
    }

    #[tokio::test]
    async fn early_reply_survives_failed_send() {
        let reply = b"HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\n\r\n";
        let (mut ours, mut theirs) = tokio::io::duplex(1024);
        theirs.write_all(reply).await.unwrap();
        drop(theirs);

        let req = request(&[("Content-Length", "4")], b"body");
        let mut client = Vec::new();
        let relayed = forwarder(64)
            .exchange(&mut ours, &mut client, &req, &rewrite(b"body", false))
            .await
            .unwrap();

        assert_eq!(relayed, reply.len() as u64);
        assert_eq!(client, reply.to_vec());
    }

    #[tokio::test]
    async fn silent_backend_keeps_send_error() {
        let (mut ours, theirs) = tokio::io::duplex(1024);
        drop(theirs);

        let req = request(&[("Content-Length", "4")], b"body");
        let mut client = Vec::new();
        let err = forwarder(64)
            .exchange(&mut ours, &mut client, &req, &rewrite(b"body", false))
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Send(_)));
        assert!(err.should_reply_bad_gateway());
        assert!(client.is_empty());
    }

    #[test]
    fn mid_stream_failures_do_not_reply() {
        let late = ForwardError::BackendRead {
            relayed: 10,
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        let early = ForwardError::BackendRead {
            relayed: 0,
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        assert!(!late.should_reply_bad_gateway());
        assert!(early.should_reply_bad_gateway());
    }

    #[tokio::test]
    async fn unreachable_backend_fails_connect() {
        // Bind then drop to find a port nothing listens on.
        let vacant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = vacant.local_addr().unwrap();
        drop(vacant);

        let mut config = ProxyConfig::default();
        config.backend.address = addr.to_string();
        let err = Forwarder::new(&config).connect().await.unwrap_err();
        assert!(matches!(err, ForwardError::Connect(_)));
    }
}
