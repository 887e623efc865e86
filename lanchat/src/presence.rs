//! Presence engine: self-announcement, presence receipt, timeout sweeping.
//!
//! Steady state is announcing: a heartbeat timer broadcasts a presence
//! envelope on a fixed interval. When a presence arrives from a peer not
//! yet in the table, the engine replies with a presence of its own,
//! unicast straight back to the new peer — so a new joiner learns about us
//! within one round trip instead of waiting out our next heartbeat. The
//! engine never blocks waiting for any reply.

use std::sync::Arc;

use lanchat_proto::envelope::Envelope;
use lanchat_proto::peer::{PeerId, Timestamp};

use crate::peers::{PeerEvent, PeerTable};
use crate::transport::Transport;

/// Announces the local node and maintains the peer table from received
/// presence and message traffic.
pub struct PresenceEngine<T> {
    self_id: PeerId,
    table: Arc<PeerTable>,
    transport: Arc<T>,
}

impl<T: Transport> PresenceEngine<T> {
    /// Creates an engine for the given identity, table, and transport.
    pub const fn new(self_id: PeerId, table: Arc<PeerTable>, transport: Arc<T>) -> Self {
        Self {
            self_id,
            table,
            transport,
        }
    }

    /// The peer table this engine maintains.
    #[must_use]
    pub const fn table(&self) -> &Arc<PeerTable> {
        &self.table
    }

    /// Broadcasts one presence announcement.
    ///
    /// Fire-and-forget: a failed broadcast is logged and the next heartbeat
    /// tries again.
    pub async fn announce(&self) {
        let envelope = Envelope::presence(self.self_id);
        if let Err(error) = self.transport.send_group(&envelope).await {
            tracing::warn!(%error, "presence broadcast failed");
        }
    }

    /// Handles a received presence announcement.
    ///
    /// Upserts the sender; if it was previously absent from the table, a
    /// presence ack is sent directly back (on a detached task) so the new
    /// peer converges without waiting for our heartbeat. Returns `true`
    /// when the sender was newly seen.
    pub fn handle_presence(&self, sender: PeerId, now: Timestamp) -> bool {
        if sender == self.self_id {
            // Self-presence never enters the table.
            return false;
        }
        let newly_seen = self.table.upsert(sender, now);
        if newly_seen {
            tracing::info!(peer = %sender, "discovered peer");
            let transport = Arc::clone(&self.transport);
            let self_id = self.self_id;
            tokio::spawn(async move {
                let ack = Envelope::presence(self_id);
                if let Err(error) = transport.send_private(sender, &ack).await {
                    tracing::debug!(peer = %sender, %error, "presence ack not delivered");
                }
            });
        }
        newly_seen
    }

    /// Refreshes `last_seen` for a peer we received any message from.
    ///
    /// Unlike [`handle_presence`](Self::handle_presence), no ack is sent.
    /// Returns `true` when the sender was newly seen.
    pub fn note_activity(&self, sender: PeerId, now: Timestamp) -> bool {
        if sender == self.self_id {
            return false;
        }
        let newly_seen = self.table.upsert(sender, now);
        if newly_seen {
            tracing::info!(peer = %sender, "discovered peer via message traffic");
        }
        newly_seen
    }

    /// Runs one timeout sweep over the table, logging transitions.
    pub fn sweep(&self, now: Timestamp) -> Vec<PeerEvent> {
        let events = self.table.sweep(now);
        for event in &events {
            match event {
                PeerEvent::WentOffline(peer) => {
                    tracing::info!(%peer, "peer went offline");
                }
                PeerEvent::Evicted(peer) => {
                    tracing::info!(%peer, "peer evicted after grace period");
                }
            }
        }
        events
    }
}
