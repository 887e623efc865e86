//! Peer table: liveness tracking with two-stage expiry.
//!
//! A peer is marked [`PeerState::Offline`] once it has been silent for the
//! user timeout, and is forgotten entirely only after twice that — so the
//! display can show a peer as offline before it disappears. Only the
//! periodic [`PeerTable::sweep`] prunes; send/receive paths never do.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use lanchat_proto::peer::{PeerId, Timestamp};

/// Liveness state of a tracked peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Heard from within the user timeout.
    Online,
    /// Silent past the user timeout, not yet evicted.
    Offline,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone)]
struct PeerRecord {
    last_seen: Timestamp,
    state: PeerState,
}

/// A point-in-time view of one table entry, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// The peer's identity.
    pub peer_id: PeerId,
    /// Liveness state at snapshot time.
    pub state: PeerState,
    /// When the peer was last heard from.
    pub last_seen: Timestamp,
}

/// State transition produced by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The peer crossed the user timeout and flipped to offline.
    /// Emitted exactly once per transition.
    WentOffline(PeerId),
    /// The peer crossed twice the user timeout and was removed.
    Evicted(PeerId),
}

/// Mapping of peer identity to liveness, guarded for concurrent access.
pub struct PeerTable {
    user_timeout_ms: u64,
    peers: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl PeerTable {
    /// Creates an empty table with the given user timeout.
    #[must_use]
    pub fn new(user_timeout: Duration) -> Self {
        Self {
            user_timeout_ms: u64::try_from(user_timeout.as_millis()).unwrap_or(u64::MAX),
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Marks a peer online and refreshes its `last_seen`.
    ///
    /// Returns `true` when the peer was previously absent from the table.
    /// Idempotent: replaying the same announcement leaves one record with
    /// the later timestamp.
    pub fn upsert(&self, peer: PeerId, now: Timestamp) -> bool {
        let mut peers = self.peers.lock();
        match peers.get_mut(&peer) {
            Some(record) => {
                record.last_seen = now;
                record.state = PeerState::Online;
                false
            }
            None => {
                peers.insert(
                    peer,
                    PeerRecord {
                        last_seen: now,
                        state: PeerState::Online,
                    },
                );
                true
            }
        }
    }

    /// Applies timeout transitions and evictions as of `now`.
    ///
    /// Peers silent past the user timeout flip Online→Offline; peers silent
    /// past twice the user timeout are removed. Returns the transitions in
    /// identity order.
    pub fn sweep(&self, now: Timestamp) -> Vec<PeerEvent> {
        let mut peers = self.peers.lock();
        let mut events = Vec::new();

        peers.retain(|peer_id, record| {
            let silent_ms = now.millis_since(record.last_seen);
            if silent_ms > self.user_timeout_ms.saturating_mul(2) {
                events.push(PeerEvent::Evicted(*peer_id));
                return false;
            }
            if silent_ms > self.user_timeout_ms && record.state == PeerState::Online {
                record.state = PeerState::Offline;
                events.push(PeerEvent::WentOffline(*peer_id));
            }
            true
        });

        events.sort_by_key(|event| match event {
            PeerEvent::WentOffline(p) | PeerEvent::Evicted(p) => *p,
        });
        events
    }

    /// Returns the current peer list, sorted by identity for stable display.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let peers = self.peers.lock();
        let mut snapshot: Vec<PeerSnapshot> = peers
            .iter()
            .map(|(peer_id, record)| PeerSnapshot {
                peer_id: *peer_id,
                state: record.state,
                last_seen: record.last_seen,
            })
            .collect();
        snapshot.sort_by_key(|entry| entry.peer_id);
        snapshot
    }

    /// Whether the table currently holds a record for `peer`.
    #[must_use]
    pub fn contains(&self, peer: PeerId) -> bool {
        self.peers.lock().contains_key(&peer)
    }

    /// Number of tracked peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}
