//! A registered connection as seen by the broadcaster.

use lanchat_core::{ClientInfo, ConnectionId};
use tokio_util::sync::CancellationToken;

use crate::server::PeerWriter;

/// One live connection in the registry.
///
/// Cloning is cheap: the writer is shared, so a snapshot can be iterated
/// and written to after the registry has moved on.
#[derive(Debug, Clone)]
pub struct Member {
    pub info: ClientInfo,

    /// Serialized write access to the peer
    pub writer: PeerWriter,

    /// Stops this connection's receive loop when the member is removed
    pub cancel: CancellationToken,
}

impl Member {
    pub fn new(info: ClientInfo, writer: PeerWriter, cancel: CancellationToken) -> Self {
        Self {
            info,
            writer,
            cancel,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    /// Closes the connection: stops the receive loop, aborts any write still
    /// in flight and shuts the write half.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.writer.shutdown().await;
    }
}
