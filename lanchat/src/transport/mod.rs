//! Transport layer for `LanChat`.
//!
//! Two logical channels, independently owned:
//! - a connectionless group channel (UDP broadcast) carrying presence and
//!   group messages, and
//! - a connection-oriented unicast channel (TCP) carrying one private
//!   message per short-lived connection.
//!
//! The [`Transport`] trait is the seam between the node core and the
//! sockets; [`lan::LanTransport`] is the real implementation and
//! [`loopback::LoopbackTransport`] is an in-process hub for tests.

pub mod lan;
pub mod loopback;

use std::net::SocketAddr;
use std::time::Duration;

use lanchat_proto::codec::DecodeError;
use lanchat_proto::envelope::Envelope;
use lanchat_proto::peer::PeerId;

/// Fatal bind/listen failure at startup. The process cannot proceed.
#[derive(Debug, thiserror::Error)]
pub enum SocketSetupError {
    /// The group (broadcast) socket could not be bound.
    #[error("failed to bind group socket on {addr}: {source}")]
    BindGroup {
        /// Address that was attempted.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The unicast listener could not be bound.
    #[error("failed to bind unicast listener on {addr}: {source}")]
    BindUnicast {
        /// Address that was attempted.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A send that could not be delivered. Surfaced to the caller, never
/// retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The target refused the connection or is not listening.
    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),

    /// The connect or write did not complete within the send timeout.
    #[error("send to {peer} timed out after {timeout:?}")]
    Timeout {
        /// The intended recipient.
        peer: PeerId,
        /// The configured per-send timeout.
        timeout: Duration,
    },

    /// The envelope could not be serialized.
    #[error(transparent)]
    Encode(#[from] DecodeError),

    /// I/O failure while writing to the peer.
    #[error("I/O error sending to {peer}: {source}")]
    Io {
        /// The intended recipient.
        peer: PeerId,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O failure on the group channel.
    #[error("group send failed: {0}")]
    Broadcast(std::io::Error),
}

/// Async transport seam between the node core and the network.
///
/// Implementations decode inbound bytes themselves: malformed datagrams are
/// dropped (logged) without disturbing the receive loop, and self-originated
/// envelopes are filtered out by comparing the envelope's sender identity
/// against the local node's — never by string-comparing local IPs.
pub trait Transport: Send + Sync + 'static {
    /// Sends an envelope to the well-known group address.
    ///
    /// Best-effort: datagram loss is accepted as given.
    fn send_group(
        &self,
        envelope: &Envelope,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;

    /// Sends an envelope point-to-point over a fresh, short-lived
    /// connection. No pooling, no reuse, no automatic retry.
    fn send_private(
        &self,
        target: PeerId,
        envelope: &Envelope,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;

    /// Yields the next decoded inbound envelope and its source address.
    ///
    /// Lazy and restartable: each call produces the next element of an
    /// infinite sequence. Returns `None` once the transport has shut down.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Option<(Envelope, SocketAddr)>> + Send;

    /// Signals the receive tasks to stop, granting in-flight connections a
    /// bounded grace period. Subsequent [`recv`](Self::recv) calls drain
    /// whatever was already queued and then return `None`.
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send;
}
