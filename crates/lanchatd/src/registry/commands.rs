//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//!
//! All types are designed for async message passing and follow the panic-free policy.

use lanchat_core::{ClientInfo, ConnectionId};
use thiserror::Error;
use tokio::sync::oneshot;

use super::member::Member;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a live connection.
    ///
    /// # Errors
    /// - `RegistryError::AlreadyRegistered` if the id is present
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Register {
        member: Member,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a connection.
    ///
    /// Responds with the removed member the first time and `None` on every
    /// later call for the same id, so exactly one caller owns the teardown.
    Remove {
        id: ConnectionId,
        respond_to: oneshot::Sender<Option<Member>>,
    },

    /// Point-in-time copy of every live member, ordered by id.
    Snapshot {
        respond_to: oneshot::Sender<Vec<Member>>,
    },

    /// Record the username a connection most recently declared.
    SetUsername {
        id: ConnectionId,
        username: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// List connection metadata, ordered by id.
    List {
        respond_to: oneshot::Sender<Vec<ClientInfo>>,
    },

    /// Number of live members.
    Count {
        respond_to: oneshot::Sender<usize>,
    },

    /// Remove every member and hand them back for teardown.
    Clear {
        respond_to: oneshot::Sender<Vec<Member>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry has reached maximum capacity.
    #[error("registry is full (max: {max} connections)")]
    RegistryFull { max: usize },

    /// A connection with this id is already registered.
    #[error("connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),

    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,
}
