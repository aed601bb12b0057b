//! lanchat Daemon - Session registry and broadcast server
//!
//! This crate provides the server side of lanchat:
//! - `registry` - Actor owning the set of live connections
//! - `server` - TCP listener, per-peer receive loops and event fan-out
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BroadcastServer                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   Accept loop   │────▶│     RegistryActor           │   │
//! │  │  (TcpListener)  │     │  (connection set owner)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ snapshot          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│────▶│       Broadcaster           │   │
//! │  │   (per peer)    │     │   (framed fan-out writes)   │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod registry;
pub mod server;

pub use server::{BroadcastReport, BroadcastServer, ServerConfig, ServerError};
