//! Byte stream with a renewable deadline.
//!
//! The deadline is armed relative to "now" with [`TimeoutStream::set_deadline`]
//! and bounds every operation issued until it is re-armed. An operation still
//! pending when the deadline passes is dropped and reported as
//! [`TransportError::TimedOut`].

use crate::error::TransportError;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};

pub struct TimeoutStream<S> {
    inner: S,
    deadline: Option<Instant>,
}

impl<S> TimeoutStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            deadline: None,
        }
    }

    /// Arm the deadline `after` from now.
    pub fn set_deadline(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    /// Read whatever is available into `buf`. `Ok(0)` is end of stream.
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize, TransportError> {
        let deadline = self.deadline;
        bounded(deadline, self.inner.read_buf(buf)).await
    }

    /// Write all of `bytes`.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let deadline = self.deadline;
        bounded(deadline, self.inner.write_all(bytes)).await
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        let deadline = self.deadline;
        bounded(deadline, self.inner.flush()).await
    }

    /// Half-close the send direction.
    ///
    /// A peer that already disconnected counts as success.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let deadline = self.deadline;
        match bounded(deadline, self.inner.shutdown()).await {
            Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

async fn bounded<F, T>(deadline: Option<Instant>, op: F) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(deadline) => match timeout_at(deadline, op).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::TimedOut),
        },
        None => op.await.map_err(TransportError::from),
    }
}
