//! Protocol record types.

use serde::{Deserialize, Serialize};

/// Username assumed when a client message omits one.
pub const DEFAULT_USERNAME: &str = "unknown";

/// Record sent from a client to the server, one per chat message.
///
/// The username is asserted by the client and never verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub content: String,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

impl ClientMessage {
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
        }
    }
}

/// Record broadcast from the server to every client.
pub type ServerMessage = lanchat_core::ChatEvent;
