//! Request dispatch contract between sessions and handlers.
//!
//! A session hands each parsed request to a [`Dispatcher`] together with a
//! [`Responder`]. The responder is consumed by [`Responder::send`], so a
//! handler can answer at most once; it may answer before `handle` returns or
//! later from any task or thread. The session only sees the response through
//! the [`Outgoing`] trait, so handlers are free to pick their body type.

use crate::protocols::http::{Request, Response};
use bytes::BytesMut;
use tokio::sync::oneshot;
use tracing::trace;

/// A response as the session writes it: head, payload and close flag.
pub trait Outgoing: Send + 'static {
    /// Append the status line and header fields, including the blank line.
    fn encode_head(&self, dst: &mut BytesMut);

    /// Bytes written after the head.
    fn payload(&self) -> &[u8];

    /// Whether the connection closes after this response.
    fn need_eof(&self) -> bool;
}

impl<B> Outgoing for Response<B>
where
    B: AsRef<[u8]> + Send + 'static,
{
    fn encode_head(&self, dst: &mut BytesMut) {
        Response::encode_head(self, dst)
    }

    fn payload(&self) -> &[u8] {
        Response::payload(self)
    }

    fn need_eof(&self) -> bool {
        Response::need_eof(self)
    }
}

/// One-shot handle used to emit the response to a request.
pub struct Responder {
    tx: oneshot::Sender<Box<dyn Outgoing>>,
}

/// Receiving side held by the session.
pub(crate) type PendingResponse = oneshot::Receiver<Box<dyn Outgoing>>;

impl Responder {
    pub(crate) fn channel() -> (Responder, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        (Responder { tx }, rx)
    }

    /// Emit the response. A session that is already gone is not an error.
    pub fn send<R: Outgoing>(self, response: R) {
        if self.tx.send(Box::new(response)).is_err() {
            trace!("Session dropped before response was emitted");
        }
    }
}

/// Request handler bound to every session of a listener.
///
/// Implementations must eventually call [`Responder::send`] exactly once and
/// must translate their own failures into a response.
pub trait Dispatcher: Send + Sync + 'static {
    fn handle(&self, request: Request, responder: Responder);
}

impl<F> Dispatcher for F
where
    F: Fn(Request, Responder) + Send + Sync + 'static,
{
    fn handle(&self, request: Request, responder: Responder) {
        self(request, responder)
    }
}
