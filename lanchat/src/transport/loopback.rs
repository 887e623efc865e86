//! In-process transport hub for tests.
//!
//! A [`LoopbackHub`] plays the role of the LAN segment: group sends fan out
//! to every attached transport (the sender's own copy is filtered on
//! receive, mirroring the broadcast socket), and private sends deliver to
//! exactly one attached transport or fail with [`DeliveryError::Unreachable`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use lanchat_proto::envelope::Envelope;
use lanchat_proto::peer::PeerId;

use super::{DeliveryError, Transport};

/// Simulated LAN segment connecting [`LoopbackTransport`] instances.
#[derive(Default)]
pub struct LoopbackHub {
    members: Mutex<HashMap<PeerId, mpsc::Sender<(Envelope, SocketAddr)>>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a node to the hub and returns its transport.
    pub fn attach(self: &Arc<Self>, self_id: PeerId, capacity: usize) -> LoopbackTransport {
        let (tx, rx) = mpsc::channel(capacity);
        self.members.lock().insert(self_id, tx);
        LoopbackTransport {
            self_id,
            hub: Arc::clone(self),
            inbound: tokio::sync::Mutex::new(rx),
        }
    }

    /// Detaches a node, making it unreachable for private sends.
    pub fn detach(&self, peer: PeerId) {
        self.members.lock().remove(&peer);
    }

    fn fan_out(&self, envelope: &Envelope, source: PeerId) {
        for tx in self.members.lock().values() {
            // The real broadcast socket also delivers the sender's own
            // datagram; each receive side filters it by sender identity.
            let _ = tx.try_send((envelope.clone(), source.addr()));
        }
    }

    fn deliver(&self, target: PeerId, envelope: &Envelope, source: PeerId) -> bool {
        self.members.lock().get(&target).is_some_and(|tx| {
            tx.try_send((envelope.clone(), source.addr())).is_ok()
        })
    }
}

/// Channel-backed transport attached to a [`LoopbackHub`].
pub struct LoopbackTransport {
    self_id: PeerId,
    hub: Arc<LoopbackHub>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<(Envelope, SocketAddr)>>,
}

impl Transport for LoopbackTransport {
    async fn send_group(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.hub.fan_out(envelope, self.self_id);
        Ok(())
    }

    async fn send_private(
        &self,
        target: PeerId,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        if self.hub.deliver(target, envelope, self.self_id) {
            Ok(())
        } else {
            Err(DeliveryError::Unreachable(target))
        }
    }

    async fn recv(&self) -> Option<(Envelope, SocketAddr)> {
        let mut inbound = self.inbound.lock().await;
        loop {
            let (envelope, source) = inbound.recv().await?;
            if envelope.sender_id() == self.self_id {
                continue;
            }
            return Some((envelope, source));
        }
    }

    async fn shutdown(&self) {
        self.hub.detach(self.self_id);
        self.inbound.lock().await.close();
    }
}
