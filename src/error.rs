//! Error taxonomy for the block exchange server.
//!
//! Per-connection errors (`TransportError`, framing errors) are fatal to the
//! affected session only. Decode and method errors are recovered into a
//! well-formed response by the dispatcher. `ServerError` aborts startup.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::warn;

use crate::protocols::http::{Method, ParseError, Status};

/// Failure of a single read, write or close on a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The deadline armed before the operation expired.
    #[error("operation timed out")]
    TimedOut,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True when the peer has already gone away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::TimedOut => false,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
        }
    }
}

/// Malformed token batch payload.
#[derive(Debug, Error)]
#[error("invalid batch payload: {0}")]
pub struct DecodeError(#[from] prost::DecodeError);

/// Request-level failures the block exchange turns into 4xx responses.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("unsupported method {0}")]
    UnsupportedMethod(Method),
}

impl ExchangeError {
    /// Status code reported to the client.
    pub fn status(&self) -> Status {
        match self {
            ExchangeError::Decode(_) => Status::BadRequest,
            ExchangeError::UnsupportedMethod(_) => Status::MethodNotAllowed,
        }
    }
}

/// A dispatcher dropped its responder without answering.
#[derive(Debug, Error)]
#[error("dispatcher dropped the request without responding")]
pub struct NoResponse;

/// Process-level failures raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Failures of the outbound client session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: TransportError,
    },
    #[error("connect to {0} timed out")]
    ConnectTimedOut(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("connection closed before a full response was received")]
    UnexpectedEof,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Report a per-connection failure to the operator log.
pub fn report(what: &str, err: &dyn std::error::Error) {
    warn!(op = what, error = %err, "Connection error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let gone = TransportError::Io(io::Error::from(io::ErrorKind::NotConnected));
        assert!(gone.is_disconnect());

        let reset = TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());

        assert!(!TransportError::TimedOut.is_disconnect());

        let other = TransportError::Io(io::Error::from(io::ErrorKind::InvalidData));
        assert!(!other.is_disconnect());
    }

    #[test]
    fn test_no_response_message() {
        assert_eq!(
            NoResponse.to_string(),
            "dispatcher dropped the request without responding"
        );
    }

    #[test]
    fn test_exchange_error_status() {
        let err = ExchangeError::UnsupportedMethod(Method::Post);
        assert_eq!(err.status(), Status::MethodNotAllowed);
        assert_eq!(err.to_string(), "unsupported method POST");
    }
}
