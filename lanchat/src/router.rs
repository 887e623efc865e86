//! Message router: classifies decoded envelopes and applies delivery and
//! display policy.
//!
//! Inbound, the dispatch table is fixed: presence goes to the presence
//! engine, group messages land in the named group's history, private
//! messages land in the sender's private thread; a display event is emitted
//! only when the target conversation is currently in view. Outbound, local
//! sends echo into history immediately — the sender never waits to receive
//! its own broadcast back.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use lanchat_proto::envelope::Envelope;
use lanchat_proto::peer::{PeerId, Timestamp};

use crate::history::{ChatHistory, ConversationKey, Session, StoredMessage};
use crate::node::NodeEvent;
use crate::peers::PeerSnapshot;
use crate::presence::PresenceEngine;
use crate::transport::{DeliveryError, Transport};

/// Dispatches envelopes between the transport, the presence engine, and
/// the history store.
pub struct Router<T> {
    session: Session,
    history: Arc<ChatHistory>,
    presence: PresenceEngine<T>,
    transport: Arc<T>,
    events: mpsc::Sender<NodeEvent>,
}

impl<T: Transport> Router<T> {
    /// Wires a router over the given session, stores, and transport.
    pub const fn new(
        session: Session,
        history: Arc<ChatHistory>,
        presence: PresenceEngine<T>,
        transport: Arc<T>,
        events: mpsc::Sender<NodeEvent>,
    ) -> Self {
        Self {
            session,
            history,
            presence,
            transport,
            events,
        }
    }

    /// The presence engine owned by this router.
    #[must_use]
    pub const fn presence(&self) -> &PresenceEngine<T> {
        &self.presence
    }

    /// The history store owned by this router.
    #[must_use]
    pub const fn history(&self) -> &Arc<ChatHistory> {
        &self.history
    }

    /// The conversation currently in view.
    #[must_use]
    pub fn current(&self) -> ConversationKey {
        self.session.current()
    }

    /// Classifies and applies one inbound envelope.
    pub fn dispatch(&self, envelope: Envelope, source: SocketAddr) {
        let now = Timestamp::now();
        match envelope {
            Envelope::Presence { sender_id, .. } => {
                if self.presence.handle_presence(sender_id, now) {
                    self.history.ensure_private(sender_id);
                    self.emit_peer_list();
                }
            }
            Envelope::GroupMessage {
                sender_id,
                timestamp,
                conversation_name,
                content,
            } => {
                self.note_sender(sender_id, now);
                let key = ConversationKey::Group(conversation_name);
                self.record_inbound(key, sender_id, content, timestamp, source);
            }
            Envelope::PrivateMessage {
                sender_id,
                timestamp,
                target_id,
                content,
            } => {
                if target_id != self.session.self_id() {
                    // The routing hint disagrees with the channel it arrived
                    // on; trust the channel and file it under the sender.
                    tracing::debug!(%source, target = %target_id, "private routing hint mismatch");
                }
                self.note_sender(sender_id, now);
                let key = ConversationKey::Private(sender_id);
                self.record_inbound(key, sender_id, content, timestamp, source);
            }
        }
    }

    /// Sends a message from the local user to a conversation.
    ///
    /// The message is appended to history and displayed immediately
    /// (optimistic local echo), then transmitted. A failed private send is
    /// reported to the presentation layer as a status event and returned to
    /// the caller; the echo stays in history.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the wire transmission fails.
    pub async fn send_to(
        &self,
        conversation: ConversationKey,
        content: String,
    ) -> Result<(), DeliveryError> {
        let timestamp = Timestamp::now();
        let self_id = self.session.self_id();
        let message = StoredMessage {
            sender: self_id,
            content: content.clone(),
            timestamp,
        };

        if !self.history.append(&conversation, message.clone()) {
            tracing::warn!(%conversation, "send to undeclared group dropped");
            return Ok(());
        }
        self.display_if_current(&conversation, &message);

        match conversation {
            ConversationKey::Group(name) => {
                self.transport
                    .send_group(&Envelope::GroupMessage {
                        sender_id: self_id,
                        timestamp,
                        conversation_name: name,
                        content,
                    })
                    .await
            }
            ConversationKey::Private(peer) => {
                let envelope = Envelope::PrivateMessage {
                    sender_id: self_id,
                    timestamp,
                    target_id: peer,
                    content,
                };
                match self.transport.send_private(peer, &envelope).await {
                    Ok(()) => Ok(()),
                    Err(error) => {
                        self.emit(NodeEvent::SendFailed {
                            target: peer,
                            reason: error.to_string(),
                        });
                        Err(error)
                    }
                }
            }
        }
    }

    /// Switches the viewed conversation. Pure view change; addressing a
    /// never-seen peer lazily creates its private thread.
    pub fn switch(&self, key: ConversationKey) {
        if let ConversationKey::Private(peer) = &key {
            self.history.ensure_private(*peer);
        }
        self.session.switch(key);
    }

    /// Current peer list, sorted for stable display.
    #[must_use]
    pub fn peer_snapshot(&self) -> Vec<PeerSnapshot> {
        self.presence.table().snapshot()
    }

    /// Emits a fresh peer list to the presentation layer.
    pub fn emit_peer_list(&self) {
        self.emit(NodeEvent::PeerListChanged(self.peer_snapshot()));
    }

    fn note_sender(&self, sender: PeerId, now: Timestamp) {
        if self.presence.note_activity(sender, now) {
            self.history.ensure_private(sender);
            self.emit_peer_list();
        }
    }

    fn record_inbound(
        &self,
        key: ConversationKey,
        sender: PeerId,
        content: String,
        timestamp: Timestamp,
        source: SocketAddr,
    ) {
        let message = StoredMessage {
            sender,
            content,
            timestamp,
        };
        if !self.history.append(&key, message.clone()) {
            tracing::warn!(%source, conversation = %key, "message for undeclared group dropped");
            return;
        }
        self.display_if_current(&key, &message);
    }

    fn display_if_current(&self, key: &ConversationKey, message: &StoredMessage) {
        if self.session.current() == *key {
            self.emit(NodeEvent::Display {
                conversation: key.clone(),
                sender: message.sender,
                content: message.content.clone(),
                timestamp: message.timestamp,
            });
        }
    }

    // Never blocks on the presentation layer: a full channel drops the
    // event instead of stalling dispatch.
    fn emit(&self, event: NodeEvent) {
        if self.events.try_send(event).is_err() {
            tracing::debug!("presentation channel full, event dropped");
        }
    }
}
