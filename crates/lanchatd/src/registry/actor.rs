//! Registry actor - owns the live connection set and processes commands.
//!
//! The RegistryActor is the single owner of connection state on the server.
//! Every mutation arrives as a command on one mpsc channel and is applied in
//! order, so concurrent accepts, removals and snapshots never race.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)

use std::collections::HashMap;

use lanchat_core::{ClientInfo, ConnectionId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError};
use super::member::Member;

/// Default maximum number of live connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// The registry actor - owns all connection state.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live members keyed by connection id
    members: HashMap<ConnectionId, Member>,

    /// Capacity limit
    max_connections: usize,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, max_connections: usize) -> Self {
        Self {
            receiver,
            members: HashMap::new(),
            max_connections,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        debug!(max_connections = self.max_connections, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!(members = self.members.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { member, respond_to } => {
                let result = self.handle_register(member);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove { id, respond_to } => {
                let result = self.handle_remove(id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.handle_snapshot());
            }
            RegistryCommand::SetUsername {
                id,
                username,
                respond_to,
            } => {
                let result = self.handle_set_username(id, username);
                let _ = respond_to.send(result);
            }
            RegistryCommand::List { respond_to } => {
                let _ = respond_to.send(self.handle_list());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.members.len());
            }
            RegistryCommand::Clear { respond_to } => {
                let _ = respond_to.send(self.handle_clear());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(&mut self, member: Member) -> Result<(), RegistryError> {
        let id = member.id();

        if self.members.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        if self.members.len() >= self.max_connections {
            warn!(
                connection = %id,
                current = self.members.len(),
                max = self.max_connections,
                "Registry is full, rejecting connection"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_connections,
            });
        }

        info!(
            connection = %id,
            peer = %member.info.addr,
            total = self.members.len() + 1,
            "Connection registered"
        );
        self.members.insert(id, member);
        Ok(())
    }

    fn handle_remove(&mut self, id: ConnectionId) -> Option<Member> {
        let removed = self.members.remove(&id);
        match &removed {
            Some(member) => info!(
                connection = %id,
                peer = %member.info.addr,
                total = self.members.len(),
                "Connection removed"
            ),
            None => debug!(connection = %id, "Connection already removed"),
        }
        removed
    }

    fn handle_snapshot(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.values().cloned().collect();
        members.sort_by_key(Member::id);
        members
    }

    fn handle_set_username(&mut self, id: ConnectionId, username: String) -> bool {
        match self.members.get_mut(&id) {
            Some(member) => {
                if member.info.username.as_deref() != Some(username.as_str()) {
                    debug!(connection = %id, username = %username, "Username declared");
                    member.info.username = Some(username);
                }
                true
            }
            None => false,
        }
    }

    fn handle_list(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> =
            self.members.values().map(|m| m.info.clone()).collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    fn handle_clear(&mut self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.drain().map(|(_, m)| m).collect();
        members.sort_by_key(Member::id);
        if !members.is_empty() {
            info!(count = members.len(), "Registry cleared");
        }
        members
    }
}
