//! Request reading and parsing.
//!
//! # Responsibilities
//! - Accumulate socket bytes until one complete request is buffered
//! - Parse the request line and headers, preserving header order and casing
//! - Honour `Content-Length`; without it the body is whatever followed the head
//!
//! # Design Decisions
//! - Reads run in a plain loop, so arbitrarily many small chunks never grow
//!   the stack
//! - httparse is re-run on the growing buffer; an invalid request line fails
//!   immediately instead of waiting for a separator that may never come
//! - Bytes after the declared body are dropped (one request per connection)

use std::collections::HashMap;
use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::LimitsConfig;

const READ_CHUNK: usize = 8 * 1024;

/// Errors raised while reading a request from the client.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("connection closed before any request bytes")]
    Closed,

    #[error("connection closed with {received} of {expected} body bytes")]
    Incomplete { expected: usize, received: usize },

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("connection closed before the end of the request head")]
    MissingSeparator,

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("more than {0} request headers")]
    TooManyHeaders(usize),

    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

impl ReadError {
    /// Errors the client caused with a malformed request, answered with 400.
    /// Everything else closes the connection silently.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReadError::Malformed(_)
                | ReadError::MissingSeparator
                | ReadError::HeadTooLarge(_)
                | ReadError::TooManyHeaders(_)
                | ReadError::InvalidContentLength(_)
        )
    }
}

/// Request headers in wire order with a case-insensitive lookup index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, Bytes)>,
    index: HashMap<String, usize>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        let name = name.into();
        self.index
            .entry(name.to_ascii_lowercase())
            .or_insert(self.entries.len());
        self.entries.push((name, value.into()));
    }

    /// First value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&i| self.entries[i].1.as_ref())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One fully received client request.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Parsed head plus the framing needed to finish the body.
struct Head {
    method: String,
    path: String,
    version: String,
    headers: Headers,
    head_len: usize,
    content_length: Option<usize>,
}

/// Reads one request from a client stream.
#[derive(Debug, Clone)]
pub struct RequestReader {
    max_header_bytes: usize,
    max_headers: usize,
}

impl RequestReader {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            max_header_bytes: limits.max_header_bytes,
            max_headers: limits.max_headers,
        }
    }

    /// Read until the head and the declared body are buffered.
    pub async fn read_request<R>(&self, reader: &mut R) -> Result<IncomingRequest, ReadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut head: Option<Head> = None;

        loop {
            if head.is_none() {
                head = self.parse_head(&buf)?;
            }

            if let Some(h) = &head {
                let expected = h.content_length.unwrap_or(0);
                if buf.len() - h.head_len >= expected {
                    break;
                }
            }

            buf.reserve(READ_CHUNK);
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(match &head {
                    None if buf.is_empty() => ReadError::Closed,
                    None => ReadError::MissingSeparator,
                    Some(h) => ReadError::Incomplete {
                        expected: h.content_length.unwrap_or(0),
                        received: buf.len() - h.head_len,
                    },
                });
            }
        }

        let Some(head) = head else {
            return Err(ReadError::MissingSeparator);
        };
        let mut body = buf.split_off(head.head_len);
        if let Some(len) = head.content_length {
            body.truncate(len);
        }

        Ok(IncomingRequest {
            method: head.method,
            path: head.path,
            version: head.version,
            headers: head.headers,
            body: body.freeze(),
        })
    }

    /// Returns `None` while the head is still incomplete.
    fn parse_head(&self, buf: &[u8]) -> Result<Option<Head>, ReadError> {
        let mut slots = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut req = httparse::Request::new(&mut slots);

        let head_len = match req.parse(buf) {
            Ok(httparse::Status::Complete(len)) if len > self.max_header_bytes => {
                return Err(ReadError::HeadTooLarge(self.max_header_bytes))
            }
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => {
                if buf.len() > self.max_header_bytes {
                    return Err(ReadError::HeadTooLarge(self.max_header_bytes));
                }
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Err(ReadError::TooManyHeaders(self.max_headers))
            }
            Err(e) => return Err(ReadError::Malformed(e.to_string())),
        };

        let (Some(method), Some(path), Some(minor)) = (req.method, req.path, req.version) else {
            return Err(ReadError::Malformed("incomplete request line".to_string()));
        };

        let mut headers = Headers::new();
        for header in req.headers.iter() {
            headers.push(header.name, Bytes::copy_from_slice(header.value));
        }

        let content_length = match headers.get("content-length") {
            Some(raw) => {
                let text = String::from_utf8_lossy(raw);
                let len = text
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ReadError::InvalidContentLength(text.to_string()))?;
                Some(len)
            }
            None => None,
        };

        Ok(Some(Head {
            method: method.to_string(),
            path: path.to_string(),
            version: format!("HTTP/1.{minor}"),
            headers,
            head_len,
            content_length,
        }))
    }
}
