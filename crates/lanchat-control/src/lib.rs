//! lanchat Control - One server and one client behind a single surface
//!
//! This crate ties the other lanchat crates together:
//! - `lanchat_core` - chat events and connection metadata
//! - `lanchat_protocol` - newline-delimited JSON framing
//! - `lanchatd` - broadcast server and session registry
//! - `lanchat_client` - chat client with a pollable event queue
//!
//! [`ChatControl`] is the surface the `lanchat` and `lanchatd` binaries
//! drive. Every operation answers with a serializable reply.

pub mod control;

pub use control::{ChatControl, ClientsReply, DrainReply, EventView, Reply, POLL_INTERVAL};
