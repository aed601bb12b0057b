//! Chat client connection.
//!
//! A [`ChatClient`] owns one TCP connection to a broadcast server:
//! - the write half is used by [`ChatClient::send`] under a mutex, with a
//!   write timeout
//! - the read half is owned by a background receive loop that numbers every
//!   incoming event and appends it to the local event queue
//! - [`ChatClient::drain_since`] empties that queue on demand
//!
//! When the connection ends for any reason the receive loop queues a final
//! `error` event, so a poller always observes the disconnect.
//! [`ChatClient::disconnect`] never waits on the network: a send stuck on a
//! server that stopped reading is abandoned.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanchat_core::{ChatEvent, Endpoint, SequencedEvent};
use lanchat_protocol::{encode_frame, ClientMessage, FrameCodec, MAX_FRAME_LEN};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

// ============================================================================
// Drain Result
// ============================================================================

/// Events handed out by one [`ChatClient::drain_since`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drain {
    /// New events in id order
    pub events: Vec<SequencedEvent>,

    /// Cursor to pass to the next drain
    pub cursor: u64,
}

// ============================================================================
// Chat Client
// ============================================================================

/// A connected chat client.
///
/// # Example
///
/// ```rust,no_run
/// use lanchat_client::{ChatClient, ClientConfig};
///
/// # async fn example() -> lanchat_client::Result<()> {
/// let client = ChatClient::connect(ClientConfig::new("localhost", 8080, "alice")).await?;
/// client.send("hello").await?;
///
/// let drain = client.drain_since(0);
/// for event in &drain.events {
///     println!("{}", event.event);
/// }
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatClient {
    username: String,
    server_addr: SocketAddr,
    local_addr: SocketAddr,
    write_timeout: Duration,

    /// Taken by `disconnect`
    writer: Mutex<Option<BufWriter<OwnedWriteHalf>>>,
    connected: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    events: std::sync::Mutex<mpsc::UnboundedReceiver<SequencedEvent>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    /// Connects to the server named by `config` and starts the receive loop.
    ///
    /// Every resolved address is tried in order. No retry after failure.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidConfig` for an empty host or port 0
    /// - `ClientError::Resolve` if the host has no usable address
    /// - `ClientError::Connect` if the connection was refused
    /// - `ClientError::Timeout` after `config.connect_timeout`
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;

        let stream = timeout(config.connect_timeout, open_stream(&endpoint))
            .await
            .map_err(|_| ClientError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: config.connect_timeout,
            })??;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let server_addr = stream.peer_addr().map_err(|e| ClientError::Connect {
            addr: SocketAddr::from(([0, 0, 0, 0], endpoint.port())),
            error: e.to_string(),
        })?;
        let local_addr = stream.local_addr().map_err(|e| ClientError::Connect {
            addr: server_addr,
            error: e.to_string(),
        })?;

        let (reader, writer) = stream.into_split();
        let (queue, events) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let cancel_token = CancellationToken::new();

        let receive_loop = ReceiveLoop {
            frames: FramedRead::new(reader, FrameCodec::new()),
            queue,
            connected: Arc::clone(&connected),
            cancel_token: cancel_token.clone(),
            next_id: 1,
        };
        let receive_task = tokio::spawn(receive_loop.run());

        let username = config.effective_username().to_string();
        info!(server = %server_addr, local = %local_addr, %username, "Connected to server");

        Ok(Self {
            username,
            server_addr,
            local_addr,
            write_timeout: config.write_timeout,
            writer: Mutex::new(Some(BufWriter::new(writer))),
            connected,
            cancel_token,
            events: std::sync::Mutex::new(events),
            receive_task: Mutex::new(Some(receive_task)),
        })
    }

    /// Sends one chat message to the server.
    ///
    /// A failed or timed out write marks the client disconnected and stops
    /// the receive loop, which then queues the disconnect notice.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotConnected` if the connection is already gone or
    ///   is closed while the write is pending
    /// - `ClientError::MessageTooLarge` if the server would drop the frame
    /// - `ClientError::Write` if the write failed
    /// - `ClientError::WriteTimeout` if the server stopped reading
    pub async fn send(&self, content: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let frame = encode_frame(&ClientMessage::new(self.username.as_str(), content))?;

        // The server's limit excludes the newline.
        let len = frame.len().saturating_sub(1);
        if len > MAX_FRAME_LEN {
            return Err(ClientError::MessageTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        let result = tokio::select! {
            biased;

            _ = self.cancel_token.cancelled() => Err(ClientError::NotConnected),
            result = self.write_frame(&frame) => result,
        };

        match result {
            Ok(()) => {
                debug!(bytes = frame.len(), "Sent message");
                Ok(())
            }
            Err(e @ (ClientError::Write(_) | ClientError::WriteTimeout(_))) => {
                warn!(server = %self.server_addr, error = %e, "Failed to send message");
                self.connected.store(false, Ordering::SeqCst);
                self.cancel_token.cancel();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(ClientError::NotConnected);
        };

        match timeout(self.write_timeout, async {
            writer.write_all(frame).await?;
            writer.flush().await
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ClientError::Write(e.to_string())),
            Err(_) => Err(ClientError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Takes everything queued so far and returns the events newer than
    /// `cursor`.
    ///
    /// The queue is emptied on every call; events at or below `cursor` are
    /// discarded. The returned cursor is the highest id handed out, or
    /// `cursor` unchanged when nothing new arrived. Works after disconnect so
    /// the final error event can still be collected.
    pub fn drain_since(&self, cursor: u64) -> Drain {
        let mut queue = self.events.lock().unwrap_or_else(PoisonError::into_inner);

        let mut events = Vec::new();
        while let Ok(event) = queue.try_recv() {
            if event.id > cursor {
                events.push(event);
            }
        }

        let cursor = events.iter().map(|e| e.id).max().unwrap_or(cursor);
        Drain { events, cursor }
    }

    /// Closes the connection.
    ///
    /// Abandons any send still in flight, waits for the receive loop to
    /// queue its disconnect notice, then shuts the socket's write side
    /// without flushing. Calling this again is a no-op.
    pub async fn disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.cancel_token.cancel();

        let Some(task) = self.receive_task.lock().await.take() else {
            debug!("Client already disconnected");
            return;
        };

        if let Err(e) = task.await {
            warn!(error = %e, "Receive task ended abnormally");
        }

        // A pending send gave the lock up when the token fired.
        if let Some(writer) = self.writer.lock().await.take() {
            let mut half = writer.into_inner();
            if let Err(e) = half.shutdown().await {
                debug!(error = %e, "Failed to shut down write half");
            }
        }

        info!(server = %self.server_addr, was_connected, "Disconnected from server");
    }

    /// Whether the connection is still believed to be open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Resolves `endpoint` and connects to the first address that accepts.
async fn open_stream(endpoint: &Endpoint) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| ClientError::Resolve {
            endpoint: endpoint.to_string(),
            error: e.to_string(),
        })?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connection attempt failed");
                last_error = Some(ClientError::Connect {
                    addr,
                    error: e.to_string(),
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ClientError::Resolve {
        endpoint: endpoint.to_string(),
        error: "no addresses found".to_string(),
    }))
}

// ============================================================================
// Receive Loop
// ============================================================================

/// State owned by the receive task.
struct ReceiveLoop {
    frames: FramedRead<OwnedReadHalf, FrameCodec<ChatEvent>>,
    queue: mpsc::UnboundedSender<SequencedEvent>,
    connected: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    next_id: u64,
}

impl ReceiveLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    debug!("Receive loop cancelled");
                    break;
                }

                frame = self.frames.next() => match frame {
                    None => {
                        info!("Server closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Connection to server failed");
                        break;
                    }
                    Some(Ok(Err(e))) => {
                        warn!(error = %e, "Dropping undecodable event");
                    }
                    Some(Ok(Ok(event))) => self.enqueue(event),
                }
            }
        }

        // Flip the state first so a drain that sees the notice also sees
        // the client as disconnected.
        self.connected.store(false, Ordering::SeqCst);
        self.enqueue(ChatEvent::disconnected());
    }

    fn enqueue(&mut self, event: ChatEvent) {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        if self.queue.send(SequencedEvent::new(id, event)).is_err() {
            debug!(id, "Event queue closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanchat_core::EventKind;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, Instant};

    const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

    /// A client connected to a bare listener; returns the server-side socket.
    async fn connected_pair() -> (ChatClient, TcpStream) {
        connected_pair_with(ClientConfig::default()).await
    }

    async fn connected_pair_with(config: ClientConfig) -> (ChatClient, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: "tester".to_string(),
            ..config
        };

        let (client, accepted) = tokio::join!(ChatClient::connect(config), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    /// Drains until `count` events arrived.
    async fn wait_for_events(client: &ChatClient, count: usize) -> Drain {
        let start = Instant::now();
        let mut all = Drain::default();
        while all.events.len() < count {
            assert!(start.elapsed() < WAIT_TIMEOUT, "got {} of {count} events", all.events.len());
            let drain = client.drain_since(all.cursor);
            all.cursor = drain.cursor;
            all.events.extend(drain.events);
            sleep(Duration::from_millis(10)).await;
        }
        all
    }

    /// Sends large messages until one fails, returning that error.
    fn spawn_flood(client: Arc<ChatClient>) -> JoinHandle<ClientError> {
        tokio::spawn(async move {
            let message = "x".repeat(60 * 1024);
            loop {
                if let Err(e) = client.send(&message).await {
                    return e;
                }
            }
        })
    }

    #[tokio::test]
    async fn test_drain_on_empty_queue_keeps_cursor() {
        let (client, _server) = connected_pair().await;

        let drain = client.drain_since(7);
        assert!(drain.events.is_empty());
        assert_eq!(drain.cursor, 7);
    }

    #[tokio::test]
    async fn test_disconnect_queues_error_event() {
        let (client, _server) = connected_pair().await;

        client.disconnect().await;
        assert!(!client.is_connected());

        let drain = client.drain_since(0);
        assert_eq!(drain.events.len(), 1);
        assert_eq!(drain.events[0].id, 1);
        assert_eq!(drain.events[0].event.kind(), EventKind::Error);
        assert_eq!(drain.cursor, 1);

        // Idempotent
        client.disconnect().await;
        assert!(client.drain_since(drain.cursor).events.is_empty());
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let (client, _server) = connected_pair().await;
        client.disconnect().await;

        let result = client.send("too late").await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_abandons_blocked_send() {
        // The server side never reads, so sends block once the socket
        // buffers are full.
        let config = ClientConfig {
            write_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        let (client, _server) = connected_pair_with(config).await;
        let client = Arc::new(client);

        let flood = spawn_flood(Arc::clone(&client));
        sleep(Duration::from_millis(500)).await;
        assert!(!flood.is_finished(), "send never blocked");

        tokio::time::timeout(WAIT_TIMEOUT, client.disconnect())
            .await
            .expect("disconnect hung behind a blocked send");

        let err = tokio::time::timeout(WAIT_TIMEOUT, flood).await.unwrap().unwrap();
        assert!(matches!(err, ClientError::NotConnected), "{err:?}");

        let drain = client.drain_since(0);
        assert_eq!(drain.events.len(), 1);
        assert_eq!(drain.events[0].event.kind(), EventKind::Error);
    }

    #[tokio::test]
    async fn test_stalled_server_times_out_send() {
        let config = ClientConfig {
            write_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let (client, _server) = connected_pair_with(config).await;
        let client = Arc::new(client);

        let err = tokio::time::timeout(WAIT_TIMEOUT, spawn_flood(Arc::clone(&client)))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, ClientError::WriteTimeout(_)), "{err:?}");
        assert!(!client.is_connected());

        let drain = wait_for_events(&client, 1).await;
        assert_eq!(drain.events[0].event.kind(), EventKind::Error);
        assert_eq!(drain.events[0].event.content(), "disconnected from server");
    }

    #[tokio::test]
    async fn test_send_to_reset_peer_disconnects() {
        let (client, server) = connected_pair().await;

        // Linger 0 turns the close into a reset.
        #[allow(deprecated)]
        server.set_linger(Some(Duration::ZERO)).unwrap();
        drop(server);

        let mut result = Ok(());
        for _ in 0..100 {
            result = client.send("anyone there?").await;
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ClientError::Write(_))), "{result:?}");
        assert!(!client.is_connected());

        let drain = wait_for_events(&client, 1).await;
        assert_eq!(drain.events.len(), 1);
        assert_eq!(drain.events[0].event.kind(), EventKind::Error);

        // The notice is handed out once.
        sleep(Duration::from_millis(50)).await;
        assert!(client.drain_since(drain.cursor).events.is_empty());
        assert!(matches!(
            client.send("still there?").await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        let (client, _server) = connected_pair().await;

        let result = client.send(&"x".repeat(MAX_FRAME_LEN + 1)).await;
        match result {
            Err(ClientError::MessageTooLarge { len, max }) => {
                assert!(len > MAX_FRAME_LEN);
                assert_eq!(max, MAX_FRAME_LEN);
            }
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }

        // Nothing was written; the connection is still usable.
        assert!(client.is_connected());
        client.send("short one").await.unwrap();
    }

    #[tokio::test]
    async fn test_blank_username_uses_default() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (client, _accepted) = tokio::join!(
            ChatClient::connect(ClientConfig::new("127.0.0.1", port, "   ")),
            listener.accept()
        );
        assert_eq!(client.unwrap().username(), "user");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = ChatClient::connect(ClientConfig::new("127.0.0.1", port, "x")).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let result = ChatClient::connect(ClientConfig::new("", 8080, "x")).await;
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }
}
