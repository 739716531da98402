//! Chunked transport sink: the seam between the encode pipeline and an
//! HTTP response in progress.
//!
//! A sink accepts successive byte chunks; the first failed write means the
//! peer is gone and aborts the remaining encode. The production
//! [`ChannelSink`] bridges into an axum response body through a capacity-1
//! channel, so no more than one chunk is ever buffered ahead of the client.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// The peer closed the connection; no further chunks can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("peer closed the transport")]
pub struct TransportClosed;

/// Trait for chunked response transports.
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    /// Write one chunk, blocking until the transport accepts it.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), TransportClosed>;
}

/// Sink feeding a response body through a bounded channel.
///
/// The receiving half is wrapped into a body stream by the server; dropping
/// the response (client disconnect) closes the channel and the next write
/// fails with [`TransportClosed`].
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Channel capacity: one chunk in flight at a time.
    const CAPACITY: usize = 1;

    /// Create a sink and the receiver to drain it from.
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(Self::CAPACITY);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), TransportClosed> {
        self.tx.send(chunk).await.map_err(|_| TransportClosed)
    }
}
