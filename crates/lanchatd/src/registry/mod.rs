//! Session registry using Actor pattern.
//!
//! The registry is the server's collection of live connections. It receives
//! commands via a tokio mpsc channel and is the only place the connection
//! set is mutated.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │   Accept loop   │────▶│                 │
//! └─────────────────┘     │                 │
//! ┌─────────────────┐     │  RegistryActor  │──▶ HashMap<ConnectionId, Member>
//! │ Receive loops   │────▶│                 │
//! └─────────────────┘     │                 │
//! ┌─────────────────┐     │                 │
//! │   Broadcaster   │────▶│                 │
//! └─────────────────┘     └─────────────────┘
//!     RegistryCommand (mpsc) / reply (oneshot)
//! ```
//!
//! The broadcaster takes a `snapshot()` and writes outside the actor, so a
//! slow peer never blocks accepts or removals.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod member;

pub use actor::{RegistryActor, DEFAULT_MAX_CONNECTIONS};
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use member::Member;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use lanchatd::registry::{spawn_registry, DEFAULT_MAX_CONNECTIONS};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(DEFAULT_MAX_CONNECTIONS);
///     let clients = handle.list().await;
///     assert!(clients.is_empty());
/// }
/// ```
pub fn spawn_registry(max_connections: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, max_connections);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
