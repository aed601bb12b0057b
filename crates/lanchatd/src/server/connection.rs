//! Per-peer connection handling.
//!
//! Each accepted socket is split in two:
//! - the write half becomes a [`PeerWriter`] stored in the registry and
//!   shared with the broadcaster
//! - the read half is owned by a [`ConnectionHandler`] running the receive
//!   loop on its own task
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in removal of that peer only

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanchat_core::{now_timestamp, ChatEvent, ConnectionId};
use lanchat_protocol::{ClientMessage, CodecError, FrameCodec};

use super::broadcast::Broadcaster;
use crate::registry::RegistryHandle;

/// Upper bound on closing a write half during teardown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// Peer Writer
// ============================================================================

/// Shared, serialized write access to one peer.
///
/// All frames for a peer go through one mutex, so concurrent broadcasts
/// never interleave partial frames on the same stream. [`PeerWriter::shutdown`]
/// aborts any write still waiting on a slow peer before it takes that mutex.
#[derive(Clone)]
pub struct PeerWriter {
    inner: Arc<Mutex<BufWriter<BoxedWriter>>>,
    closed: CancellationToken,
}

impl PeerWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedWriter = Box::new(writer);
        Self {
            inner: Arc::new(Mutex::new(BufWriter::new(boxed))),
            closed: CancellationToken::new(),
        }
    }

    /// Writes one complete frame and flushes it.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Io` if the peer is gone
    /// - `ConnectionError::WriteTimeout` if the write did not finish in time
    /// - `ConnectionError::Closed` if the writer was shut down first
    pub async fn write_frame(
        &self,
        frame: &[u8],
        write_timeout: Duration,
    ) -> Result<(), ConnectionError> {
        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(ConnectionError::Closed),
            result = self.write_locked(frame, write_timeout) => result,
        }
    }

    async fn write_locked(
        &self,
        frame: &[u8],
        write_timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let mut writer = self.inner.lock().await;

        match timeout(write_timeout, async {
            writer.write_all(frame).await?;
            writer.flush().await?;
            Ok::<(), io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Shuts the write half down. Best effort: errors are logged only.
    ///
    /// Pending writes fail with `ConnectionError::Closed` and bytes still
    /// buffered for the peer are discarded.
    pub async fn shutdown(&self) {
        self.closed.cancel();

        let mut writer = self.inner.lock().await;
        match timeout(SHUTDOWN_TIMEOUT, writer.get_mut().shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Writer shutdown failed"),
            Err(_) => debug!("Writer shutdown timed out"),
        }
    }
}

impl fmt::Debug for PeerWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerWriter").finish_non_exhaustive()
    }
}

// ============================================================================
// Connection Handler
// ============================================================================

/// Receive loop for a single peer.
///
/// Reads framed `ClientMessage`s, stamps each with the peer's IP and the
/// server's local time, and broadcasts the resulting message event. When
/// the stream ends the peer is removed and a "peer left" event is broadcast.
pub struct ConnectionHandler<R> {
    reader: R,
    peer: PeerContext,
    max_frame_len: usize,
}

/// Everything the receive loop needs besides the read half.
struct PeerContext {
    id: ConnectionId,
    addr: SocketAddr,
    registry: RegistryHandle,
    broadcaster: Broadcaster,
    cancel: CancellationToken,
}

/// Why a receive loop stopped.
#[derive(Debug)]
enum Ending {
    /// Peer closed its side
    Eof,

    /// Read failed
    Failed(CodecError),

    /// Removed by the broadcaster or the server is stopping
    Cancelled,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `id` - Registry id of this connection
    /// * `addr` - Remote address of the peer
    /// * `reader` - Read half of the stream
    /// * `registry` - Handle to the session registry
    /// * `broadcaster` - Fan-out for decoded events
    /// * `cancel` - Token cancelled when this connection must close
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        reader: R,
        registry: RegistryHandle,
        broadcaster: Broadcaster,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            peer: PeerContext {
                id,
                addr,
                registry,
                broadcaster,
                cancel,
            },
            max_frame_len: lanchat_protocol::MAX_FRAME_LEN,
        }
    }

    /// Overrides the maximum accepted frame length.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Runs the receive loop until the peer goes away or the connection is
    /// cancelled, then tears the connection down.
    pub async fn run(self) {
        let Self {
            reader,
            peer,
            max_frame_len,
        } = self;

        debug!(connection = %peer.id, peer = %peer.addr, "Receive loop started");

        let codec = FrameCodec::<ClientMessage>::with_max_length(max_frame_len);
        let mut frames = FramedRead::new(reader, codec);

        let ending = loop {
            tokio::select! {
                _ = peer.cancel.cancelled() => break Ending::Cancelled,

                frame = frames.next() => match frame {
                    None => break Ending::Eof,
                    Some(Err(e)) => break Ending::Failed(e),
                    Some(Ok(Err(e))) => {
                        warn!(
                            connection = %peer.id,
                            peer = %peer.addr,
                            error = %e,
                            "Dropping undecodable frame"
                        );
                    }
                    Some(Ok(Ok(msg))) => peer.handle_message(msg).await,
                },
            }
        };

        drop(frames);
        peer.finish(ending).await;
    }
}

impl PeerContext {
    /// Stamps a client message with its origin and broadcasts it.
    async fn handle_message(&self, msg: ClientMessage) {
        let ip = self.addr.ip().to_string();
        let timestamp = now_timestamp();

        debug!(
            connection = %self.id,
            username = %msg.username,
            len = msg.content.len(),
            "Received message"
        );

        self.registry.set_username(self.id, msg.username.as_str()).await;

        let event = ChatEvent::message(msg.username, &msg.content, ip, timestamp);
        self.broadcaster.broadcast(&event).await;
    }

    /// Removes this peer and, if the removal was ours, announces it.
    async fn finish(self, ending: Ending) {
        match &ending {
            Ending::Eof => debug!(connection = %self.id, "Peer closed the connection"),
            Ending::Failed(e) => debug!(connection = %self.id, error = %e, "Connection read failed"),
            Ending::Cancelled => debug!(connection = %self.id, "Receive loop cancelled"),
        }

        let Some(member) = self.registry.remove(self.id).await else {
            // Someone else removed us and owns the announcement.
            return;
        };
        member.close().await;

        if matches!(ending, Ending::Cancelled) {
            return;
        }

        info!(connection = %self.id, peer = %self.addr, "Peer left");
        let notice = ChatEvent::peer_left(self.addr.ip().to_string(), now_timestamp());
        self.broadcaster.broadcast(&notice).await;
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while writing to a peer.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::WriteTimeout.to_string(), "Write timeout");
        assert_eq!(ConnectionError::Closed.to_string(), "Connection closed");
        assert!(ConnectionError::Io("broken pipe".to_string())
            .to_string()
            .contains("broken pipe"));
    }

    #[tokio::test]
    async fn test_peer_writer_writes_whole_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        let writer = PeerWriter::new(client);

        writer
            .write_frame(b"{\"type\":\"system\",\"content\":\"x\"}\n", Duration::from_secs(1))
            .await
            .unwrap();
        writer.shutdown().await;

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "{\"type\":\"system\",\"content\":\"x\"}\n");
    }

    #[tokio::test]
    async fn test_peer_writer_reports_closed_peer() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let writer = PeerWriter::new(client);

        let err = writer
            .write_frame(b"hello\n", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Io(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_writer_times_out_on_stalled_peer() {
        // Nobody reads the other end, so the 8-byte buffer fills up.
        let (client, _server) = tokio::io::duplex(8);
        let writer = PeerWriter::new(client);

        let err = writer
            .write_frame(&[b'x'; 64], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, ConnectionError::WriteTimeout);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stalled_write() {
        let (client, _server) = tokio::io::duplex(8);
        let writer = PeerWriter::new(client);

        let stalled = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer
                    .write_frame(&[b'x'; 64], Duration::from_secs(60))
                    .await
            }
        });
        // Let the write take the lock and fill the buffer.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stalled.is_finished());

        tokio::time::timeout(Duration::from_secs(1), writer.shutdown())
            .await
            .expect("shutdown waited for the stalled write");

        let result = tokio::time::timeout(Duration::from_secs(1), stalled)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn test_write_after_shutdown_is_rejected() {
        let (client, _server) = tokio::io::duplex(64);
        let writer = PeerWriter::new(client);
        writer.shutdown().await;

        let err = writer
            .write_frame(b"late\n", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ConnectionError::Closed);
    }
}
