//! Connection identity and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Server-assigned identifier for one accepted connection.
///
/// Unique for the lifetime of a server instance; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Client Info
// ============================================================================

/// Read-only view of a registered connection, used for client listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ConnectionId,

    /// Remote address of the peer
    pub addr: SocketAddr,

    /// Most recent username the peer declared (unverified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    pub connected_at: DateTime<Utc>,
}

impl ClientInfo {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            username: None,
            connected_at: Utc::now(),
        }
    }

    /// The peer's IP address as display text.
    pub fn ip(&self) -> String {
        self.addr.ip().to_string()
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A validated `host:port` pair to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidFieldValue` for an empty host or port 0.
    pub fn new(host: impl Into<String>, port: u16) -> DomainResult<Self> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid("host", &host, "a hostname or IP address"));
        }
        if port == 0 {
            return Err(DomainError::invalid("port", port, "1-65535"));
        }
        Ok(Self {
            host: trimmed.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
