//! Per-connection request handling.
//!
//! ```text
//! client socket
//!     → RequestReader   (400 on malformed input, silent close on EOF/error)
//!     → ThinkingRewriter
//!     → Forwarder::connect          (502 on failure)
//!     → Forwarder::exchange         (send, relay; 502 only if nothing relayed yet)
//! ```

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::http::forward::{ForwardError, Forwarder};
use crate::http::request::{ReadError, RequestReader};
use crate::http::response::ErrorReply;
use crate::observability::metrics;
use crate::resilience::timeouts::{deadline, with_deadline};
use crate::rewrite::ThinkingRewriter;

/// Read-only state shared by every connection task.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    reader: RequestReader,
    rewriter: ThinkingRewriter,
    forwarder: Forwarder,
    request_deadline: Option<Duration>,
}

impl ProxyContext {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            reader: RequestReader::new(&config.limits),
            rewriter: ThinkingRewriter::new(config.thinking.clone()),
            forwarder: Forwarder::new(config),
            request_deadline: deadline(config.timeouts.request_read_secs),
        }
    }
}

/// Serve one accepted connection to completion.
///
/// Never returns an error: every failure is logged, answered where HTTP
/// still allows it, and ends with both sockets closed.
pub async fn handle_connection(ctx: &ProxyContext, mut client: TcpStream) {
    let start = Instant::now();
    let _ = client.set_nodelay(true);

    let request = match with_deadline(ctx.request_deadline, ctx.reader.read_request(&mut client)).await
    {
        Ok(Ok(request)) => request,
        Ok(Err(e)) if e.is_client_error() => {
            tracing::warn!(error = %e, "Rejecting malformed request");
            reply(&mut client, ErrorReply::BadRequest).await;
            metrics::record_request("bad_request", start);
            return;
        }
        Ok(Err(ReadError::Closed)) => {
            tracing::debug!("Client closed before sending a request");
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Dropping connection while reading request");
            metrics::record_request("aborted", start);
            return;
        }
        Err(elapsed) => {
            tracing::warn!(limit = ?elapsed.0, "Request not received in time");
            metrics::record_request("aborted", start);
            return;
        }
    };

    tracing::debug!(
        method = %request.method,
        path = %request.path,
        body_len = request.body.len(),
        "Request received"
    );

    let rewrite = ctx.rewriter.rewrite(&request.method, request.body.clone());
    let transformed = rewrite.transformed;

    let result = async {
        let mut backend = ctx.forwarder.connect().await?;
        ctx.forwarder
            .exchange(&mut backend, &mut client, &request, &rewrite)
            .await
    }
    .await;

    match result {
        Ok(relayed) => {
            if transformed {
                // Connection: close was promised to the backend; end the client stream too.
                let _ = client.shutdown().await;
            }
            metrics::record_relayed_bytes(relayed);
            metrics::record_request("relayed", start);
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                transformed,
                relayed,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request completed"
            );
        }
        Err(e) if e.should_reply_bad_gateway() => {
            log_forward_error(&e);
            reply(&mut client, ErrorReply::BadGateway).await;
            metrics::record_request("bad_gateway", start);
        }
        Err(e) => {
            log_forward_error(&e);
            metrics::record_request("aborted", start);
        }
    }
}

async fn reply(client: &mut TcpStream, reply: ErrorReply) {
    if let Err(e) = reply.send(client).await {
        tracing::debug!(status = reply.status(), error = %e, "Failed to send error reply");
    }
}

fn log_forward_error(error: &ForwardError) {
    match error {
        ForwardError::ClientWrite { .. } => tracing::debug!(error = %error, "Client went away"),
        ForwardError::Connect(_) | ForwardError::ConnectTimeout(_) => {
            tracing::warn!(error = %error, "Backend unreachable")
        }
        _ => tracing::error!(error = %error, "Forwarding failed"),
    }
}
