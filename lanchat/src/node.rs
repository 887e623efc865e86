//! Node wiring: spawns the background tasks and exposes the command/event
//! channels the presentation collaborator talks to.
//!
//! ```text
//! presentation (GUI / CLI)  ←── NodeEvent ───  tokio background tasks
//!                            ─── NodeCommand →
//! ```
//!
//! Four tasks run concurrently: the transport receive loop, the heartbeat
//! timer, the sweep timer, and the command handler. The peer table and chat
//! history each sit behind their own lock; a slow private send never stalls
//! broadcast receipt or the heartbeat.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use lanchat_proto::peer::{PeerId, Timestamp};

use crate::config::NodeConfig;
use crate::history::{ChatHistory, ConversationKey, Session};
use crate::peers::{PeerSnapshot, PeerTable};
use crate::presence::PresenceEngine;
use crate::router::Router;
use crate::transport::Transport;

/// Commands sent from the presentation layer into the core.
#[derive(Debug, Clone)]
pub enum NodeCommand {
    /// Send a message to a conversation.
    Send {
        /// Target conversation.
        conversation: ConversationKey,
        /// Message text.
        content: String,
    },
    /// Change which conversation is in view. Never mutates history.
    SwitchConversation(ConversationKey),
    /// Gracefully stop all background tasks.
    Shutdown,
}

/// Events emitted by the core for the presentation layer.
///
/// Delivery is non-blocking: if the presentation side falls behind, events
/// are dropped rather than stalling the core.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A message should be shown in the currently viewed conversation.
    Display {
        /// Which conversation the message belongs to.
        conversation: ConversationKey,
        /// Who authored it (a peer, or the local node).
        sender: PeerId,
        /// Message text.
        content: String,
        /// Author-side creation time.
        timestamp: Timestamp,
    },
    /// The peer list changed (discovery, offline transition, or eviction).
    PeerListChanged(Vec<PeerSnapshot>),
    /// A private send could not be delivered. Not retried.
    SendFailed {
        /// The intended recipient.
        target: PeerId,
        /// Human-readable reason.
        reason: String,
    },
}

/// Channel handles returned by [`spawn_node`].
pub struct NodeHandle {
    /// The local node's identity.
    pub self_id: PeerId,
    /// Command channel into the core.
    pub commands: mpsc::Sender<NodeCommand>,
    /// Event stream out of the core.
    pub events: mpsc::Receiver<NodeEvent>,
}

/// Spawns the node's background tasks over the given transport.
///
/// The first heartbeat fires immediately, so a starting node announces
/// itself without waiting a full interval (and peers ack straight back).
pub fn spawn_node<T: Transport>(transport: T, config: &NodeConfig) -> NodeHandle {
    let self_id = config.self_id();
    let transport = Arc::new(transport);
    let table = Arc::new(PeerTable::new(config.user_timeout));
    let history = Arc::new(ChatHistory::new(&config.groups));
    let initial = config.groups.first().map_or_else(
        || ConversationKey::Group("general".to_string()),
        |name| ConversationKey::Group(name.clone()),
    );
    let session = Session::new(self_id, initial);
    let presence = PresenceEngine::new(self_id, table, Arc::clone(&transport));

    let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
    let (command_tx, mut command_rx) = mpsc::channel::<NodeCommand>(config.channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let router = Arc::new(Router::new(
        session,
        history,
        presence,
        Arc::clone(&transport),
        event_tx,
    ));

    // Receive loop: transport → router, until the transport shuts down.
    {
        let router = Arc::clone(&router);
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some((envelope, source)) = transport.recv().await {
                router.dispatch(envelope, source);
            }
            tracing::debug!("receive loop ended");
        });
    }

    // Heartbeat timer.
    {
        let router = Arc::clone(&router);
        let mut shutdown = shutdown_rx.clone();
        let interval = config.heartbeat_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tick.tick() => router.presence().announce().await,
                }
            }
        });
    }

    // Sweep timer, independent of message traffic.
    {
        let router = Arc::clone(&router);
        let mut shutdown = shutdown_rx;
        let interval = config.cleanup_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tick.tick() => {
                        let transitions = router.presence().sweep(Timestamp::now());
                        if !transitions.is_empty() {
                            router.emit_peer_list();
                        }
                    }
                }
            }
        });
    }

    // Command handler. Owns shutdown: signals the timers and stops the
    // transport, which in turn ends the receive loop.
    {
        let router = Arc::clone(&router);
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    NodeCommand::Send {
                        conversation,
                        content,
                    } => {
                        if let Err(error) = router.send_to(conversation, content).await {
                            tracing::warn!(%error, "send failed");
                        }
                    }
                    NodeCommand::SwitchConversation(key) => router.switch(key),
                    NodeCommand::Shutdown => break,
                }
            }
            let _ = shutdown_tx.send(true);
            transport.shutdown().await;
            tracing::info!("node stopped");
        });
    }

    NodeHandle {
        self_id,
        commands: command_tx,
        events: event_rx,
    }
}
