//! Client connection settings.

use std::time::Duration;

use lanchat_core::{DomainResult, Endpoint};

/// Default server host
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;

/// Username used when none is given
pub const DEFAULT_USERNAME: &str = "user";

/// How long a connection attempt may take (5 seconds)
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one outbound message may take to write (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a chat client.
///
/// # Example
///
/// ```rust
/// use lanchat_client::ClientConfig;
///
/// let config = ClientConfig {
///     host: "192.168.1.20".to_string(),
///     username: "alice".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.endpoint().unwrap().to_string(), "192.168.1.20:8080");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Name sent with every message. Not verified by the server.
    pub username: String,

    /// Upper bound for resolving and connecting.
    pub connect_timeout: Duration,

    /// Upper bound for writing one message. A server that stops reading
    /// for longer than this is treated as gone.
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Default configuration for `host:port` as `username`.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            ..Default::default()
        }
    }

    /// The validated server endpoint.
    ///
    /// # Errors
    ///
    /// Returns a `DomainError` for an empty host or port 0.
    pub fn endpoint(&self) -> DomainResult<Endpoint> {
        Endpoint::new(self.host.as_str(), self.port)
    }

    /// The username to send, falling back to [`DEFAULT_USERNAME`] when blank.
    pub fn effective_username(&self) -> &str {
        match self.username.trim() {
            "" => DEFAULT_USERNAME,
            name => name,
        }
    }
}
