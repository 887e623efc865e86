//! Wire envelope types for the `LanChat` protocol.
//!
//! Every datagram on the group channel and every unicast connection carries
//! exactly one [`Envelope`], serialized as UTF-8 JSON with a `type` tag so
//! the receiver can classify it before further processing.

use serde::{Deserialize, Serialize};

use crate::peer::{PeerId, Timestamp};

/// Maximum datagram payload size in bytes.
///
/// Receivers read into a fixed buffer of this size. Oversized sends are
/// truncated at the transport boundary and will fail to decode on the far
/// side — a known limitation of the datagram channel.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// The decoded unit of wire data.
///
/// The serialized form is a JSON object whose `type` field is one of
/// `presence`, `group_message`, or `private_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Announcement that a node is alive, refreshing the peer table.
    Presence {
        /// The announcing node's identity.
        sender_id: PeerId,
        /// When the announcement was created.
        timestamp: Timestamp,
    },
    /// A message fanned out to a named group channel.
    GroupMessage {
        /// The sending node's identity.
        sender_id: PeerId,
        /// When the message was created.
        timestamp: Timestamp,
        /// Which group channel the message belongs to.
        conversation_name: String,
        /// The message text.
        content: String,
    },
    /// A point-to-point message with a routing hint.
    PrivateMessage {
        /// The sending node's identity.
        sender_id: PeerId,
        /// When the message was created.
        timestamp: Timestamp,
        /// The intended recipient.
        target_id: PeerId,
        /// The message text.
        content: String,
    },
}

impl Envelope {
    /// Who sent this envelope.
    #[must_use]
    pub const fn sender_id(&self) -> PeerId {
        match self {
            Self::Presence { sender_id, .. }
            | Self::GroupMessage { sender_id, .. }
            | Self::PrivateMessage { sender_id, .. } => *sender_id,
        }
    }

    /// When this envelope was created, per the sender's clock.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        match self {
            Self::Presence { timestamp, .. }
            | Self::GroupMessage { timestamp, .. }
            | Self::PrivateMessage { timestamp, .. } => *timestamp,
        }
    }

    /// Builds a presence announcement stamped with the current time.
    #[must_use]
    pub fn presence(sender_id: PeerId) -> Self {
        Self::Presence {
            sender_id,
            timestamp: Timestamp::now(),
        }
    }
}
