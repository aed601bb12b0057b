//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or an empty result

use tokio::sync::{mpsc, oneshot};

use lanchat_core::{ClientInfo, ConnectionId};

use super::commands::{RegistryCommand, RegistryError};
use super::member::Member;

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// The actor stops once every handle has been dropped.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Register a live connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyRegistered` if the id is already present
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, member: Member) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                member,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a connection.
    ///
    /// Idempotent: returns the member on the first call and `None` on every
    /// later call (or if the actor is gone). Whoever receives `Some` is
    /// responsible for closing the connection.
    pub async fn remove(&self, id: ConnectionId) -> Option<Member> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove { id, respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Point-in-time copy of every live member, ordered by id.
    ///
    /// The copy is safe to iterate while other tasks register and remove.
    pub async fn snapshot(&self) -> Vec<Member> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Record the username a connection declared. Returns `false` if the
    /// connection is no longer registered.
    pub async fn set_username(&self, id: ConnectionId, username: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::SetUsername {
                id,
                username: username.into(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// List metadata for every live connection, ordered by id.
    pub async fn list(&self) -> Vec<ClientInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::List { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of live connections (0 if the actor is gone).
    pub async fn len(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Count { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every member and return them for teardown.
    pub async fn clear(&self) -> Vec<Member> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Clear { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }
}
