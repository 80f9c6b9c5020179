//! One-shot outbound client session.
//!
//! The mirror image of a server session: connect, write one request, read
//! one response, half-close. Every step runs under its own deadline.

use crate::error::ClientError;
use crate::protocols::http::{parse_response, Method, ParseResult, Request, ResponseMessage};
use crate::runtime::stream::TimeoutStream;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Deadline applied to each client step.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

const BUFFER_SIZE: usize = 16 * 1024;

pub struct Connection {
    stream: TimeoutStream<TcpStream>,
    buffer: BytesMut,
    timeout: Duration,
}

impl Connection {
    /// Connect to `addr` (`host:port`), giving up after `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ClientError::Connect {
                    addr: addr.to_string(),
                    source: e.into(),
                })
            }
            Err(_) => return Err(ClientError::ConnectTimedOut(addr.to_string())),
        };
        // Requests are written in one go; don't hold them back
        stream.set_nodelay(true).map_err(|e| ClientError::Connect {
            addr: addr.to_string(),
            source: e.into(),
        })?;
        debug!(addr, "Connected");

        Ok(Self {
            stream: TimeoutStream::new(stream),
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            timeout,
        })
    }

    pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        let mut encoded = BytesMut::new();
        request.encode(&mut encoded);

        self.stream.set_deadline(self.timeout);
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        trace!(bytes = encoded.len(), "Request sent");
        Ok(())
    }

    /// Read one full response. Set `head_request` when answering a HEAD.
    ///
    /// The body size is not capped: a batch reply grows with the number of
    /// tokens sent, up to the directory's block size per token.
    pub async fn receive(&mut self, head_request: bool) -> Result<ResponseMessage, ClientError> {
        self.stream.set_deadline(self.timeout);

        loop {
            match parse_response(&self.buffer, usize::MAX, head_request) {
                ParseResult::Complete(response, consumed) => {
                    self.buffer.advance(consumed);
                    trace!(status = response.status, "Response received");
                    return Ok(response);
                }
                ParseResult::Incomplete => {}
                ParseResult::Error(e) => return Err(e.into()),
            }

            self.buffer.reserve(BUFFER_SIZE);
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::UnexpectedEof);
            }
        }
    }

    /// Half-close the connection. A peer that already left is fine.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.set_deadline(self.timeout);
        self.stream.close().await?;
        Ok(())
    }
}

/// Join a host and port into a connectable address, bracketing IPv6
/// literals.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Connect, send `request`, read the response and close.
pub async fn exchange(
    addr: &str,
    request: &Request,
    timeout: Duration,
) -> Result<ResponseMessage, ClientError> {
    let mut conn = Connection::connect(addr, timeout).await?;
    conn.send(request).await?;
    let response = conn.receive(request.method == Method::Head).await?;
    conn.close().await?;
    Ok(response)
}
