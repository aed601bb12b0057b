//! Error types for the chat client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::net::SocketAddr;
use std::time::Duration;

use lanchat_core::DomainError;
use lanchat_protocol::EncodeError;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Chat client errors.
///
/// None of these are retried by the client; the caller decides whether to
/// connect again.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The configured host or port is unusable.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(#[from] DomainError),

    /// The host name could not be resolved to any address.
    #[error("Failed to resolve {endpoint}: {error}")]
    Resolve { endpoint: String, error: String },

    /// Every resolved address refused or failed the connection.
    #[error("Failed to connect to {addr}: {error}")]
    Connect { addr: SocketAddr, error: String },

    /// Resolving and connecting took longer than the configured timeout.
    #[error("Timed out connecting to {endpoint} after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// The client is not (or no longer) connected.
    #[error("Not connected to a server")]
    NotConnected,

    /// Writing to the server failed; the client is now disconnected.
    #[error("Failed to send message: {0}")]
    Write(String),

    /// The server stopped accepting data; the client is now disconnected.
    #[error("Timed out sending message after {0:?}")]
    WriteTimeout(Duration),

    /// The encoded message is longer than the server accepts. Nothing was
    /// sent and the client stays connected.
    #[error("Message too large: {len} bytes (max: {max})")]
    MessageTooLarge { len: usize, max: usize },

    /// The outbound message could not be serialized.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] EncodeError),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
