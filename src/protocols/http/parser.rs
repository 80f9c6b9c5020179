//! HTTP/1.x message parser.
//!
//! Messages are framed by `Content-Length` only. Parsing never consumes
//! input: callers advance their buffer by the returned byte count, so any
//! pipelined bytes after a complete message stay buffered for the next call.

use super::message::{Headers, Method, Request, Version};
use bytes::Bytes;
use thiserror::Error;

/// Largest accepted message head (start line plus header fields).
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Framing errors. Any of these makes the connection unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message head exceeds {} bytes", MAX_HEAD_SIZE)]
    HeadTooLarge,
    #[error("message head is not valid UTF-8")]
    InvalidEncoding,
    #[error("invalid start line: {0}")]
    InvalidStartLine(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid header line: {0}")]
    InvalidHeader(String),
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    #[error("transfer-encoding is not supported")]
    UnsupportedTransferEncoding,
    #[error("body of {0} bytes exceeds limit")]
    BodyTooLarge(usize),
}

/// Result of parsing a buffer.
#[derive(Debug)]
pub enum ParseResult<T> {
    /// Complete message and the number of bytes it occupied.
    Complete(T, usize),
    /// Need more data.
    Incomplete,
    Error(ParseError),
}

impl<T> From<Result<Option<(T, usize)>, ParseError>> for ParseResult<T> {
    fn from(result: Result<Option<(T, usize)>, ParseError>) -> Self {
        match result {
            Ok(Some((message, consumed))) => ParseResult::Complete(message, consumed),
            Ok(None) => ParseResult::Incomplete,
            Err(e) => ParseResult::Error(e),
        }
    }
}

/// A response as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl ResponseMessage {
    pub fn keep_alive(&self) -> bool {
        super::message::is_keep_alive(self.version, &self.headers)
    }
}

/// Parse one request from the front of `input`.
pub fn parse_request(input: &[u8], max_body: usize) -> ParseResult<Request> {
    try_parse_request(input, max_body).into()
}

/// Parse one response from the front of `input`.
///
/// `head_request` must be set when the response answers a HEAD request,
/// whose advertised length is not followed by a body.
pub fn parse_response(
    input: &[u8],
    max_body: usize,
    head_request: bool,
) -> ParseResult<ResponseMessage> {
    try_parse_response(input, max_body, head_request).into()
}

fn try_parse_request(input: &[u8], max_body: usize) -> Result<Option<(Request, usize)>, ParseError> {
    let head = match split_head(input)? {
        Some(head) => head,
        None => return Ok(None),
    };

    let mut parts = head.start.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
        _ => return Err(ParseError::InvalidStartLine(head.start.to_string())),
    };
    let version =
        Version::parse(version).ok_or_else(|| ParseError::UnsupportedVersion(version.to_string()))?;

    let body_len = body_length(&head.headers, max_body)?;
    let total = head.len + body_len;
    if input.len() < total {
        return Ok(None);
    }

    let request = Request {
        method: Method::parse(method),
        target: target.to_string(),
        version,
        headers: head.headers,
        body: Bytes::copy_from_slice(&input[head.len..total]),
    };
    Ok(Some((request, total)))
}

fn try_parse_response(
    input: &[u8],
    max_body: usize,
    head_request: bool,
) -> Result<Option<(ResponseMessage, usize)>, ParseError> {
    let head = match split_head(input)? {
        Some(head) => head,
        None => return Ok(None),
    };

    // HTTP/1.1 200 OK
    let mut parts = head.start.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let version =
        Version::parse(version).ok_or_else(|| ParseError::UnsupportedVersion(version.to_string()))?;
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or_else(|| ParseError::InvalidStartLine(head.start.to_string()))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let body_len = if head_request {
        0
    } else {
        body_length(&head.headers, max_body)?
    };
    let total = head.len + body_len;
    if input.len() < total {
        return Ok(None);
    }

    let response = ResponseMessage {
        version,
        status,
        reason,
        headers: head.headers,
        body: Bytes::copy_from_slice(&input[head.len..total]),
    };
    Ok(Some((response, total)))
}

struct Head<'a> {
    start: &'a str,
    headers: Headers,
    /// Bytes up to and including the blank line.
    len: usize,
}

fn split_head(input: &[u8]) -> Result<Option<Head<'_>>, ParseError> {
    let end = match find_head_end(input) {
        Some(pos) => pos,
        None if input.len() > MAX_HEAD_SIZE => return Err(ParseError::HeadTooLarge),
        None => return Ok(None),
    };
    if end > MAX_HEAD_SIZE {
        return Err(ParseError::HeadTooLarge);
    }

    let text = std::str::from_utf8(&input[..end]).map_err(|_| ParseError::InvalidEncoding)?;
    let mut lines = text.split("\r\n");
    let start = lines.next().unwrap_or_default();

    let mut headers = Headers::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ParseError::InvalidHeader(line.to_string()));
        }
        headers.append(name, value.trim());
    }

    Ok(Some(Head {
        start,
        headers,
        len: end + 4,
    }))
}

fn body_length(headers: &Headers, max_body: usize) -> Result<usize, ParseError> {
    if headers.get("transfer-encoding").is_some() {
        return Err(ParseError::UnsupportedTransferEncoding);
    }
    match headers.get("content-length") {
        None => Ok(0),
        Some(value) => {
            let len = value
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?;
            if len > max_body {
                return Err(ParseError::BodyTooLarge(len));
            }
            Ok(len)
        }
    }
}

/// Position of the `\r\n\r\n` that ends a message head.
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}
