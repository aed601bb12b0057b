//! Chat events as they travel from the server to every listener.
//!
//! A `ChatEvent` is built once (by the server on receipt, or by the client
//! when it synthesizes a disconnect notice) and never mutated afterwards.
//! The client wraps each received event in a `SequencedEvent` carrying a
//! purely local sequence id used for poll cursoring.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display format for event timestamps (second precision, server local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Content of the system event broadcast when a peer goes away.
const PEER_LEFT: &str = "user left the chat";

/// Content of the error event a client queues when its connection ends.
const DISCONNECTED: &str = "disconnected from server";

/// Returns the current local time formatted with [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ============================================================================
// Event Kind
// ============================================================================

/// The kind of a chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user-authored message relayed by the server
    Message,

    /// A server notice, e.g. a peer left
    System,

    /// A local error notice, e.g. the client lost its connection
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::System => write!(f, "system"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Chat Event
// ============================================================================

/// One chat event.
///
/// Serialized flat with a `type` discriminator field, matching the broadcast
/// record `{type, content, timestamp, ip, username}`; absent optionals are
/// omitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    kind: EventKind,

    content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl ChatEvent {
    /// Creates a message event stamped with the sender's origin.
    ///
    /// The display content has the form `ip | timestamp | username: text`.
    pub fn message(
        username: impl Into<String>,
        text: &str,
        ip: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        let username = username.into();
        let ip = ip.into();
        let timestamp = timestamp.into();
        Self {
            kind: EventKind::Message,
            content: format!("{ip} | {timestamp} | {username}: {text}"),
            timestamp: Some(timestamp),
            ip: Some(ip),
            username: Some(username),
        }
    }

    /// Creates the system event announcing that the peer at `ip` left.
    pub fn peer_left(ip: impl Into<String>, timestamp: impl Into<String>) -> Self {
        let ip = ip.into();
        let timestamp = timestamp.into();
        Self {
            kind: EventKind::System,
            content: format!("{ip} | {timestamp} | {PEER_LEFT}"),
            timestamp: Some(timestamp),
            ip: Some(ip),
            username: None,
        }
    }

    /// Creates a system event with arbitrary content.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::System,
            content: content.into(),
            timestamp: None,
            ip: None,
            username: None,
        }
    }

    /// Creates an error event with arbitrary content.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            content: content.into(),
            timestamp: None,
            ip: None,
            username: None,
        }
    }

    /// The error event a client queues when its connection to the server ends.
    pub fn disconnected() -> Self {
        Self::error(DISCONNECTED)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Display content.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Origin IP stamped by the server.
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Client-declared username (message events only).
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Message => write!(f, "{}", self.content),
            EventKind::System => write!(f, "[system] {}", self.content),
            EventKind::Error => write!(f, "[error] {}", self.content),
        }
    }
}

// ============================================================================
// Sequenced Event
// ============================================================================

/// A received event tagged with the client's local sequence id.
///
/// Ids are assigned by each client instance in receive order, starting at 1.
/// They are never sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub id: u64,

    #[serde(flatten)]
    pub event: ChatEvent,
}

impl SequencedEvent {
    pub fn new(id: u64, event: ChatEvent) -> Self {
        Self { id, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_content_carries_origin() {
        let event = ChatEvent::message("alice", "hello", "192.168.1.7", "2024-01-01 12:00:00");
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(
            event.content(),
            "192.168.1.7 | 2024-01-01 12:00:00 | alice: hello"
        );
        assert_eq!(event.ip(), Some("192.168.1.7"));
        assert_eq!(event.username(), Some("alice"));
    }

    #[test]
    fn test_peer_left_is_system_event() {
        let event = ChatEvent::peer_left("10.0.0.2", "2024-01-01 12:00:00");
        assert_eq!(event.kind(), EventKind::System);
        assert!(event.content().contains("10.0.0.2"));
        assert!(event.content().contains("left"));
        assert!(event.username().is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let event = ChatEvent::message("bob", "hi", "127.0.0.1", "2024-01-01 00:00:00");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"ip\":\"127.0.0.1\""));
        assert!(json.contains("\"username\":\"bob\""));
        assert!(json.contains("\"timestamp\":\"2024-01-01 00:00:00\""));
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let json = serde_json::to_string(&ChatEvent::disconnected()).unwrap();
        assert_eq!(json, r#"{"type":"error","content":"disconnected from server"}"#);
    }

    #[test]
    fn test_system_record_without_ip_parses() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type":"system","content":"x","timestamp":"t"}"#).unwrap();
        assert_eq!(event.kind(), EventKind::System);
        assert!(event.ip().is_none());
        assert_eq!(event.timestamp(), Some("t"));
    }

    #[test]
    fn test_sequenced_event_flattens() {
        let seq = SequencedEvent::new(3, ChatEvent::system("hi"));
        let json = serde_json::to_string(&seq).unwrap();
        assert!(json.contains("\"id\":3"));
        assert!(json.contains("\"type\":\"system\""));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        assert_eq!(ts.len(), "2024-01-01 12:00:00".len());
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }
}
