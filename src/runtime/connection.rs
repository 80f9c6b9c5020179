//! Session state machine for one accepted connection.
//!
//! ```text
//! Reading -> Dispatching -> Writing -> Reading (keep-alive)
//!                                   -> Closing -> Closed
//! ```
//!
//! Every error path goes straight to `Closing`; nothing is retried. A session
//! runs as a single task, so its own reads and writes never overlap, and at
//! most one read or one write is outstanding at any time.

use crate::error::{report, NoResponse, TransportError};
use crate::protocols::http::{parse_request, ParseResult, Request};
use crate::runtime::dispatch::{Dispatcher, Outgoing, Responder};
use crate::runtime::stream::TimeoutStream;
use bytes::{Buf, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Deadline armed before each read and each write.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit on a request body.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Per-session limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: REQUEST_TIMEOUT,
            max_body_size: MAX_BODY_SIZE,
        }
    }
}

/// Current state of a session, carrying the data the next step needs.
pub enum ConnState {
    /// Waiting for a complete request.
    Reading,
    /// Request handed to the dispatcher, waiting for its response.
    Dispatching(Request),
    /// Writing the response.
    Writing(Box<dyn Outgoing>),
    /// Half-closing the connection.
    Closing,
    Closed,
}

impl ConnState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnState::Reading => "reading",
            ConnState::Dispatching(_) => "dispatching",
            ConnState::Writing(_) => "writing",
            ConnState::Closing => "closing",
            ConnState::Closed => "closed",
        }
    }
}

/// Owns one connection and drives its request/response cycles.
pub struct Session<S> {
    stream: TimeoutStream<S>,
    /// Survives across requests so pipelined bytes are not lost.
    buffer: BytesMut,
    dispatcher: Arc<dyn Dispatcher>,
    config: SessionConfig,
    served: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, dispatcher: Arc<dyn Dispatcher>, config: SessionConfig) -> Self {
        Self {
            stream: TimeoutStream::new(stream),
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            dispatcher,
            config,
            served: 0,
        }
    }

    /// Run until the connection is closed. Consumes the session.
    pub async fn run(mut self) {
        let mut state = ConnState::Reading;

        loop {
            trace!(state = state.name(), "Session step");
            state = match state {
                ConnState::Reading => self.read().await,
                ConnState::Dispatching(request) => self.dispatch(request).await,
                ConnState::Writing(response) => self.write(response).await,
                ConnState::Closing => self.close().await,
                ConnState::Closed => break,
            };
        }

        debug!(served = self.served, "Session closed");
    }

    async fn read(&mut self) -> ConnState {
        self.stream.set_deadline(self.config.timeout);

        loop {
            match parse_request(&self.buffer, self.config.max_body_size) {
                ParseResult::Complete(request, consumed) => {
                    self.buffer.advance(consumed);
                    trace!(
                        method = %request.method,
                        target = %request.target,
                        body_len = request.body.len(),
                        "Request received"
                    );
                    return ConnState::Dispatching(request);
                }
                ParseResult::Incomplete => {}
                ParseResult::Error(e) => {
                    report("read", &e);
                    return ConnState::Closing;
                }
            }

            self.buffer.reserve(BUFFER_SIZE);
            match self.stream.read_buf(&mut self.buffer).await {
                Ok(0) if self.buffer.is_empty() => {
                    trace!("Connection closed by client");
                    return ConnState::Closing;
                }
                Ok(0) => {
                    debug!(buffered = self.buffer.len(), "Connection closed mid-request");
                    return ConnState::Closing;
                }
                Ok(_) => {}
                Err(e) => {
                    report("read", &e);
                    return ConnState::Closing;
                }
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> ConnState {
        let (responder, pending) = Responder::channel();
        self.dispatcher.handle(request, responder);

        match pending.await {
            Ok(response) => ConnState::Writing(response),
            Err(_) => {
                report("dispatch", &NoResponse);
                ConnState::Closing
            }
        }
    }

    async fn write(&mut self, response: Box<dyn Outgoing>) -> ConnState {
        self.stream.set_deadline(self.config.timeout);

        let mut head = BytesMut::with_capacity(256);
        response.encode_head(&mut head);

        let payload = response.payload();
        let result = self.send(&head, payload).await;

        match result {
            Ok(()) => {
                self.served += 1;
                if response.need_eof() {
                    ConnState::Closing
                } else {
                    ConnState::Reading
                }
            }
            Err(e) => {
                report("write", &e);
                ConnState::Closing
            }
        }
    }

    async fn send(&mut self, head: &[u8], payload: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(head).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) -> ConnState {
        self.stream.set_deadline(self.config.timeout);
        if let Err(e) = self.stream.close().await {
            report("shutdown", &e);
        }
        ConnState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::http::{Response, Status};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;
    use tokio_test::io::Builder;

    /// Answers every request with `<METHOD> <target>` as text.
    fn echo_dispatcher() -> Arc<dyn Dispatcher> {
        Arc::new(|request: Request, responder: Responder| {
            let body = format!("{} {}", request.method, request.target);
            responder.send(
                Response::new(Status::Ok, request.version, body)
                    .content_type("text/plain")
                    .keep_alive(request.keep_alive()),
            );
        })
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConnState::Reading.name(), "reading");
        assert_eq!(ConnState::Closing.name(), "closing");
        assert_eq!(ConnState::Closed.name(), "closed");
    }

    #[tokio::test]
    async fn test_keep_alive_loop() {
        let stream = Builder::new()
            .read(b"GET /one HTTP/1.1\r\n\r\n")
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 8\r\n\r\nGET /one")
            .read(b"GET /two HTTP/1.1\r\n\r\n")
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 8\r\n\r\nGET /two")
            .build();

        Session::new(stream, echo_dispatcher(), SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let stream = Builder::new()
            .read(b"GET /sp")
            .read(b"lit HTTP/1.1\r\nContent-Le")
            .read(b"ngth: 2\r\n\r\nh")
            .read(b"i")
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 10\r\n\r\nGET /split")
            .build();

        Session::new(stream, echo_dispatcher(), SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_http10_closes_after_response() {
        // The second pipelined request must never be answered
        let stream = Builder::new()
            .read(b"GET /a HTTP/1.0\r\n\r\nGET /b HTTP/1.0\r\n\r\n")
            .write(b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nGET /a")
            .build();

        Session::new(stream, echo_dispatcher(), SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_connection_close_header() {
        let stream = Builder::new()
            .read(b"GET /a HTTP/1.1\r\nConnection: close\r\n\r\nGET /b HTTP/1.1\r\n\r\n")
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\nConnection: close\r\n\r\nGET /a")
            .build();

        Session::new(stream, echo_dispatcher(), SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_framing_error_closes_without_response() {
        let stream = Builder::new().read(b"NOT HTTP AT ALL\r\n\r\n").build();

        Session::new(stream, echo_dispatcher(), SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_oversized_body_closes() {
        let stream = Builder::new()
            .read(b"GET / HTTP/1.1\r\nContent-Length: 100\r\n\r\n")
            .build();
        let config = SessionConfig {
            max_body_size: 10,
            ..SessionConfig::default()
        };

        Session::new(stream, echo_dispatcher(), config).run().await;
    }

    #[tokio::test]
    async fn test_dropped_responder_closes() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(|_request: Request, responder: Responder| {
            drop(responder);
        });
        let stream = Builder::new().read(b"GET / HTTP/1.1\r\n\r\n").build();

        Session::new(stream, dispatcher, SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_deferred_dispatch() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(|request: Request, responder: Responder| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                responder.send(Response::new(Status::Ok, request.version, "later"));
            });
        });
        let stream = Builder::new()
            .read(b"GET / HTTP/1.1\r\n\r\n")
            .write(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nlater")
            .build();

        Session::new(stream, dispatcher, SessionConfig::default())
            .run()
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(|request: Request, responder: Responder| {
            responder.send(Response::new(Status::Ok, request.version, vec![b'x'; 1024 * 1024]));
        });
        let (mut client, server) = duplex(64);
        let start = Instant::now();
        let session = tokio::spawn(Session::new(server, dispatcher, SessionConfig::default()).run());

        // Request goes in, but the response is never drained
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        session.await.unwrap();
        assert!(start.elapsed() >= REQUEST_TIMEOUT);
        drop(client);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_times_out() {
        let (mut client, server) = duplex(1024);
        let start = Instant::now();
        let session = tokio::spawn(
            Session::new(server, echo_dispatcher(), SessionConfig::default()).run(),
        );

        // First request is served, then the client goes quiet
        let expected: &[u8] =
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nGET /x";
        client.write_all(b"GET /x HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = vec![0u8; expected.len()];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(&response[..], expected);

        session.await.unwrap();
        assert!(start.elapsed() >= REQUEST_TIMEOUT);

        // Server half-closed its side
        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);
    }
}
