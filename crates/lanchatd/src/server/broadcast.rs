//! Event fan-out to every registered connection.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info};

use lanchat_core::{now_timestamp, ChatEvent, ConnectionId};
use lanchat_protocol::encode_frame;

use crate::registry::{Member, RegistryHandle};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members in the snapshot, i.e. write attempts made
    pub attempted: usize,

    /// Writes that failed or were aborted by a closing member; those
    /// members were removed
    pub failed: usize,
}

impl BroadcastReport {
    pub fn delivered(&self) -> usize {
        self.attempted.saturating_sub(self.failed)
    }
}

/// Writes events to every member of a registry snapshot.
///
/// Cheap to clone; every receive loop holds one.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: RegistryHandle,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: RegistryHandle, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// Delivers `event` to every live connection, the sender's own included.
    ///
    /// A failed write never stops delivery to the others. Failed members are
    /// removed after the pass and their departure is broadcast in turn.
    /// The report covers `event` itself.
    pub async fn broadcast(&self, event: &ChatEvent) -> BroadcastReport {
        let (report, mut departed) = self.fan_out(event).await;

        while let Some(member) = departed.pop() {
            info!(
                connection = %member.id(),
                peer = %member.info.addr,
                "Peer dropped after failed write"
            );
            let notice = ChatEvent::peer_left(member.info.ip(), now_timestamp());
            let (_, more) = self.fan_out(&notice).await;
            departed.extend(more);
        }

        report
    }

    /// One pass over a snapshot: encode once, write everywhere, then remove
    /// the failures. Returns the members this pass actually removed.
    async fn fan_out(&self, event: &ChatEvent) -> (BroadcastReport, Vec<Member>) {
        let frame = match encode_frame(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize event");
                return (BroadcastReport::default(), Vec::new());
            }
        };

        let members = self.registry.snapshot().await;

        let results = join_all(members.iter().map(|member| {
            let frame = &frame;
            async move {
                let result = member.writer.write_frame(frame, self.write_timeout).await;
                (member, result)
            }
        }))
        .await;

        let mut failed: Vec<ConnectionId> = Vec::new();
        for (member, result) in results {
            if let Err(e) = result {
                debug!(
                    connection = %member.id(),
                    peer = %member.info.addr,
                    error = %e,
                    "Failed to send event to peer"
                );
                failed.push(member.id());
            }
        }

        let report = BroadcastReport {
            attempted: members.len(),
            failed: failed.len(),
        };

        debug!(
            kind = %event.kind(),
            attempted = report.attempted,
            delivered = report.delivered(),
            failed = report.failed,
            "Broadcast complete"
        );

        // Remove only after the pass; the snapshot is never mutated.
        let mut departed = Vec::new();
        for id in failed {
            if let Some(member) = self.registry.remove(id).await {
                member.close().await;
                departed.push(member);
            }
        }

        (report, departed)
    }
}
