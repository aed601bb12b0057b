//! lanchat Core - Shared types for local-network chat
//!
//! This crate provides the domain types shared between
//! the broadcast server (lanchatd) and the chat client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod connection;
pub mod error;
pub mod event;

// Re-exports for convenience
pub use connection::{ClientInfo, ConnectionId, Endpoint};
pub use error::{DomainError, DomainResult};
pub use event::{now_timestamp, ChatEvent, EventKind, SequencedEvent, TIMESTAMP_FORMAT};
