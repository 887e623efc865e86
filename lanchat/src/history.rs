//! Per-conversation message history and session state.
//!
//! History is append-only for the lifetime of the process and never touches
//! disk. Group conversations come from the fixed channel set declared at
//! startup; private conversations are created lazily the first time a peer
//! is discovered or addressed.

use std::collections::HashMap;

use parking_lot::Mutex;

use lanchat_proto::peer::{PeerId, Timestamp};

/// Identifies a conversation: a named group channel or a private thread
/// keyed by peer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationKey {
    /// A pre-declared group channel.
    Group(String),
    /// A point-to-point thread with one peer.
    Private(PeerId),
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group(name) => write!(f, "#{name}"),
            Self::Private(peer) => write!(f, "@{peer}"),
        }
    }
}

/// One message as stored in history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Who authored the message (a peer, or the local node itself).
    pub sender: PeerId,
    /// The message text.
    pub content: String,
    /// When the message was created, per the author's clock.
    pub timestamp: Timestamp,
}

/// In-memory conversation logs, insertion-ordered per conversation.
///
/// Thread-safe via [`Mutex`]. Appends from the receive path and the local
/// send path are the only writers.
pub struct ChatHistory {
    conversations: Mutex<HashMap<ConversationKey, Vec<StoredMessage>>>,
}

impl ChatHistory {
    /// Creates a history with the given group channels pre-declared.
    ///
    /// Messages for group names outside this set are rejected by
    /// [`append`](Self::append).
    #[must_use]
    pub fn new(groups: &[String]) -> Self {
        let conversations = groups
            .iter()
            .map(|name| (ConversationKey::Group(name.clone()), Vec::new()))
            .collect();
        Self {
            conversations: Mutex::new(conversations),
        }
    }

    /// Appends a message to a conversation.
    ///
    /// Private conversations are created on first use. Group conversations
    /// must have been declared at startup; returns `false` (and stores
    /// nothing) for an unknown group name.
    pub fn append(&self, key: &ConversationKey, message: StoredMessage) -> bool {
        let mut conversations = self.conversations.lock();
        match key {
            ConversationKey::Group(_) => match conversations.get_mut(key) {
                Some(log) => {
                    log.push(message);
                    true
                }
                None => false,
            },
            ConversationKey::Private(_) => {
                conversations.entry(key.clone()).or_default().push(message);
                true
            }
        }
    }

    /// Ensures a private conversation exists for `peer`, creating an empty
    /// log if needed. Idempotent.
    pub fn ensure_private(&self, peer: PeerId) {
        self.conversations
            .lock()
            .entry(ConversationKey::Private(peer))
            .or_default();
    }

    /// Returns a copy of one conversation's log, in insertion order.
    /// Unknown conversations yield an empty log.
    #[must_use]
    pub fn conversation(&self, key: &ConversationKey) -> Vec<StoredMessage> {
        self.conversations.lock().get(key).cloned().unwrap_or_default()
    }

    /// Returns the declared group channel names, sorted for stable display.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .conversations
            .lock()
            .keys()
            .filter_map(|key| match key {
                ConversationKey::Group(name) => Some(name.clone()),
                ConversationKey::Private(_) => None,
            })
            .collect();
        names.sort();
        names
    }
}

/// Per-node session state: who we are and which conversation is in view.
///
/// Switching conversations is a pure view change and never mutates history.
pub struct Session {
    self_id: PeerId,
    current: Mutex<ConversationKey>,
}

impl Session {
    /// Creates a session starting in `initial`.
    #[must_use]
    pub const fn new(self_id: PeerId, initial: ConversationKey) -> Self {
        Self {
            self_id,
            current: Mutex::new(initial),
        }
    }

    /// The local node's identity.
    #[must_use]
    pub const fn self_id(&self) -> PeerId {
        self.self_id
    }

    /// The conversation currently in view.
    #[must_use]
    pub fn current(&self) -> ConversationKey {
        self.current.lock().clone()
    }

    /// Switches the view to another conversation.
    pub fn switch(&self, key: ConversationKey) {
        *self.current.lock() = key;
    }
}
