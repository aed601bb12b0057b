//! TCP broadcast server.
//!
//! The server:
//! - Listens on a TCP port for chat clients
//! - Registers each accepted connection and spawns a ConnectionHandler for it
//! - Fans every decoded message out to all registered connections
//! - Stops immediately via `BroadcastServer::stop`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ BroadcastServer │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per peer)    │     │                 │
//! └───────┬─────────┘     └────────┬────────┘
//!         │ ChatEvent              │ snapshot()
//!         ▼                        ▼
//! ┌──────────────────────────────────────────┐
//! │               Broadcaster                │
//! │   (one framed write per live peer)       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod broadcast;
mod connection;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use connection::{ConnectionError, ConnectionHandler, PeerWriter};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lanchat_core::{ChatEvent, ClientInfo, ConnectionId};
use lanchat_protocol::MAX_FRAME_LEN;

use crate::registry::{
    spawn_registry, Member, RegistryError, RegistryHandle, DEFAULT_MAX_CONNECTIONS,
};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 8080;

/// Write timeout per peer (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the broadcast server.
///
/// # Example
///
/// ```rust
/// use lanchatd::server::ServerConfig;
///
/// let config = ServerConfig {
///     port: 9000,
///     ..Default::default()
/// };
/// assert_eq!(config.socket_addr().port(), 9000);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind; `0.0.0.0` accepts peers from the whole LAN.
    pub bind_address: IpAddr,

    /// Port to listen on; 0 picks an ephemeral port.
    pub port: u16,

    /// Maximum number of simultaneously registered connections.
    pub max_connections: usize,

    /// Per-peer write timeout during fan-out.
    pub write_timeout: Duration,

    /// Maximum accepted frame length in bytes.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            write_timeout: WRITE_TIMEOUT,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    /// Default configuration listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

// ============================================================================
// Broadcast Server
// ============================================================================

/// A running broadcast server.
///
/// Returned by [`BroadcastServer::start`] and held by the caller; there is no
/// process-wide server. Dropping the handle without calling
/// [`stop`](Self::stop) still cancels the accept loop and every receive loop.
pub struct BroadcastServer {
    local_addr: SocketAddr,
    registry: RegistryHandle,
    broadcaster: Broadcaster,
    cancel_token: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastServer {
    /// Binds and starts accepting connections.
    ///
    /// # Errors
    ///
    /// `ServerError::Bind` if the address is in use, not permitted or
    /// otherwise unusable. Not retried.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.socket_addr();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;

        let registry = spawn_registry(config.max_connections);
        let broadcaster = Broadcaster::new(registry.clone(), config.write_timeout);
        let cancel_token = CancellationToken::new();

        let acceptor = Acceptor {
            listener,
            registry: registry.clone(),
            broadcaster: broadcaster.clone(),
            cancel_token: cancel_token.clone(),
            connection_counter: AtomicU64::new(1),
            max_frame_len: config.max_frame_len,
        };
        let accept_task = tokio::spawn(acceptor.run());

        info!(addr = %local_addr, "Broadcast server listening");

        Ok(Self {
            local_addr,
            registry,
            broadcaster,
            cancel_token,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the server is still listening.
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }

    /// Lists the currently registered connections.
    pub async fn clients(&self) -> Vec<ClientInfo> {
        self.registry.list().await
    }

    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    /// Broadcasts a server-originated event to every connection.
    pub async fn broadcast(&self, event: &ChatEvent) -> BroadcastReport {
        self.broadcaster.broadcast(event).await
    }

    /// Stops the server.
    ///
    /// Closes the listener, forcibly closes every connection and clears the
    /// registry. Unsent data is lost. Calling this again is a no-op.
    pub async fn stop(&self) {
        let Some(task) = self.accept_task.lock().await.take() else {
            debug!("Server already stopped");
            return;
        };

        self.cancel_token.cancel();

        // Wait for the accept loop so no connection is registered after the clear.
        if let Err(e) = task.await {
            warn!(error = %e, "Accept task ended abnormally");
        }

        let members = self.registry.clear().await;
        let closed = members.len();
        for member in members {
            member.close().await;
        }

        info!(addr = %self.local_addr, closed, "Broadcast server stopped");
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

/// State owned by the accept task.
struct Acceptor {
    listener: TcpListener,
    registry: RegistryHandle,
    broadcaster: Broadcaster,
    cancel_token: CancellationToken,
    connection_counter: AtomicU64,
    max_frame_len: usize,
}

impl Acceptor {
    /// Accepts connections until cancelled. The listener closes on return.
    async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Accept loop shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.admit(stream, addr).await,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }
    }

    /// Registers a new connection and spawns its receive loop.
    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let id = ConnectionId::new(self.connection_counter.fetch_add(1, Ordering::Relaxed));
        let (reader, writer) = stream.into_split();
        let writer = PeerWriter::new(writer);
        let cancel = self.cancel_token.child_token();

        let member = Member::new(ClientInfo::new(id, addr), writer, cancel.clone());

        match self.registry.register(member.clone()).await {
            Ok(()) => {
                let handler = ConnectionHandler::new(
                    id,
                    addr,
                    reader,
                    self.registry.clone(),
                    self.broadcaster.clone(),
                    cancel,
                )
                .with_max_frame_len(self.max_frame_len);

                tokio::spawn(handler.run());
            }
            Err(e @ RegistryError::RegistryFull { .. }) => {
                warn!(peer = %addr, error = %e, "Rejecting connection");
                member.close().await;
            }
            Err(e) => {
                error!(peer = %addr, error = %e, "Failed to register connection");
                member.close().await;
            }
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}
