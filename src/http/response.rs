//! Locally generated responses.
//!
//! The proxy only ever answers on its own behalf when it cannot hand the
//! request to the backend: 400 for requests it cannot parse, 502 when the
//! backend cannot be reached. Everything else is the backend's response,
//! relayed untouched.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Error statuses the proxy emits itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
    BadRequest,
    BadGateway,
}

impl ErrorReply {
    pub fn status(&self) -> u16 {
        match self {
            ErrorReply::BadRequest => 400,
            ErrorReply::BadGateway => 502,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ErrorReply::BadRequest => "Bad Request",
            ErrorReply::BadGateway => "Bad Gateway",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ErrorReply::BadRequest => "Bad Request: malformed HTTP request\n",
            ErrorReply::BadGateway => "Bad Gateway: backend unavailable\n",
        }
    }

    /// Full wire form: status line, headers and plain-text body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body();
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status(),
            self.reason(),
            body.len(),
            body
        )
        .into_bytes()
    }

    /// Write the reply and close the write half.
    pub async fn send<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        writer.shutdown().await
    }
}
