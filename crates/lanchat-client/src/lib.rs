//! lanchat Client - Chat client for a lanchat broadcast server
//!
//! This crate provides:
//! - `ChatClient` - TCP connection, outbound messages and a background
//!   receive loop feeding a local event queue
//! - `ClientConfig` - Connection settings with sensible defaults
//! - `ClientError` - Everything that can go wrong on the client side
//!
//! Received events are never pushed to the caller. They are collected in a
//! queue and handed out by [`ChatClient::drain_since`], which a poller calls
//! on an interval.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`

pub mod client;
pub mod config;
pub mod error;

pub use client::{ChatClient, Drain};
pub use config::{
    ClientConfig, CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USERNAME, WRITE_TIMEOUT,
};
pub use error::{ClientError, Result};
