//! Control surface for one chat process.
//!
//! [`ChatControl`] holds at most one running server and at most one
//! connected client, and exposes the operations a front end needs: start and
//! stop the server, connect and disconnect the client, send, poll for new
//! events, and list connected peers. Every operation answers with a
//! serializable reply instead of an error, so an HTTP layer or a terminal UI
//! can forward the result as-is.
//!
//! Front ends are expected to call [`ChatControl::drain_messages`] every
//! [`POLL_INTERVAL`], passing back the cursor from the previous reply.
//!
//! The client handle is shared, never locked across network I/O: a send
//! stuck on a slow server does not hold up polling or disconnecting.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use lanchat_client::{ChatClient, ClientConfig, ClientError};
use lanchat_core::{ClientInfo, EventKind, SequencedEvent};
use lanchatd::{BroadcastServer, ServerConfig};

/// How often front ends poll for new events (500 ms)
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// Replies
// ============================================================================

/// Outcome of a control operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub ok: bool,
    pub message: String,
}

impl Reply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// One event as handed to a front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventView {
    pub id: u64,

    #[serde(rename = "type")]
    pub kind: EventKind,

    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl From<SequencedEvent> for EventView {
    fn from(sequenced: SequencedEvent) -> Self {
        let event = sequenced.event;
        Self {
            id: sequenced.id,
            kind: event.kind(),
            content: event.content().to_string(),
            ip: event.ip().map(str::to_string),
            timestamp: event.timestamp().map(str::to_string),
            username: event.username().map(str::to_string),
        }
    }
}

/// Reply to [`ChatControl::drain_messages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReply {
    /// False when no client exists
    pub ok: bool,

    pub events: Vec<EventView>,

    /// Cursor for the next poll
    pub cursor: u64,
}

/// Reply to [`ChatControl::list_clients`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientsReply {
    /// False when no server is running
    pub ok: bool,

    pub clients: Vec<ClientInfo>,
}

// ============================================================================
// Chat Control
// ============================================================================

/// Owner of this process's server and client handles.
#[derive(Default)]
pub struct ChatControl {
    server: Mutex<Option<BroadcastServer>>,
    client: Mutex<Option<Arc<ChatClient>>>,
}

impl ChatControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a server on all interfaces at `port`.
    pub async fn start_server(&self, port: u16) -> Reply {
        self.start_server_with(ServerConfig::with_port(port)).await
    }

    /// Starts a server with a full configuration.
    pub async fn start_server_with(&self, config: ServerConfig) -> Reply {
        let mut server = self.server.lock().await;
        if server.as_ref().is_some_and(BroadcastServer::is_running) {
            return Reply::failure("server is already running");
        }

        match BroadcastServer::start(config).await {
            Ok(started) => {
                let port = started.local_addr().port();
                *server = Some(started);
                Reply::success(format!("server started on port {port}"))
            }
            Err(e) => {
                warn!(error = %e, "Failed to start server");
                Reply::failure(format!("failed to start server: {e}"))
            }
        }
    }

    /// Stops the running server and closes every connection it holds.
    pub async fn stop_server(&self) -> Reply {
        let Some(server) = self.server.lock().await.take() else {
            return Reply::failure("server is not running");
        };

        server.stop().await;
        Reply::success("server stopped")
    }

    /// The bound port of the running server, if any.
    pub async fn server_port(&self) -> Option<u16> {
        self.server
            .lock()
            .await
            .as_ref()
            .map(|server| server.local_addr().port())
    }

    /// Connects the client to `host:port` as `username`.
    ///
    /// A previous client that already lost its connection is replaced.
    pub async fn connect_client(&self, host: &str, port: u16, username: &str) -> Reply {
        let mut client = self.client.lock().await;
        if client.as_deref().is_some_and(ChatClient::is_connected) {
            return Reply::failure("client is already connected");
        }

        if let Some(stale) = client.take() {
            debug!(server = %stale.server_addr(), "Replacing disconnected client");
            stale.disconnect().await;
        }

        match ChatClient::connect(ClientConfig::new(host, port, username)).await {
            Ok(connected) => {
                let message = format!("connected to {}", connected.server_addr());
                *client = Some(Arc::new(connected));
                Reply::success(message)
            }
            Err(e) => {
                warn!(host, port, error = %e, "Failed to connect client");
                Reply::failure(format!("failed to connect: {e}"))
            }
        }
    }

    /// The current client, cloned out of the lock.
    async fn current_client(&self) -> Option<Arc<ChatClient>> {
        self.client.lock().await.clone()
    }

    /// Sends one message through the connected client.
    pub async fn send_message(&self, content: &str) -> Reply {
        let Some(client) = self.current_client().await else {
            return Reply::failure("client is not connected");
        };

        match client.send(content).await {
            Ok(()) => Reply::success("message sent"),
            Err(ClientError::NotConnected) => Reply::failure("client is not connected"),
            Err(e) => Reply::failure(format!("failed to send message: {e}")),
        }
    }

    /// Returns events newer than `cursor`.
    ///
    /// Keeps answering after the connection dropped, so the final
    /// disconnect notice reaches the front end.
    pub async fn drain_messages(&self, cursor: u64) -> DrainReply {
        let Some(client) = self.current_client().await else {
            return DrainReply {
                ok: false,
                events: Vec::new(),
                cursor,
            };
        };

        let drain = client.drain_since(cursor);
        DrainReply {
            ok: true,
            events: drain.events.into_iter().map(EventView::from).collect(),
            cursor: drain.cursor,
        }
    }

    /// Disconnects and discards the client.
    ///
    /// A send still in flight on another task fails with "client is not
    /// connected".
    pub async fn disconnect_client(&self) -> Reply {
        let Some(client) = self.client.lock().await.take() else {
            return Reply::failure("client is not connected");
        };

        client.disconnect().await;
        Reply::success("client disconnected")
    }

    /// Whether a client exists and is still connected.
    pub async fn is_client_connected(&self) -> bool {
        self.client
            .lock()
            .await
            .as_deref()
            .is_some_and(ChatClient::is_connected)
    }

    /// Lists the peers connected to the running server.
    pub async fn list_clients(&self) -> ClientsReply {
        let server = self.server.lock().await;
        match server.as_ref() {
            Some(server) => ClientsReply {
                ok: true,
                clients: server.clients().await,
            },
            None => ClientsReply {
                ok: false,
                clients: Vec::new(),
            },
        }
    }

    /// Disconnects the client and stops the server, whichever exist.
    pub async fn shutdown(&self) {
        if let Some(client) = self.client.lock().await.take() {
            client.disconnect().await;
        }
        if let Some(server) = self.server.lock().await.take() {
            server.stop().await;
        }
        info!("Chat control shut down");
    }
}
