//! Real-socket transport: UDP broadcast group channel + TCP unicast channel.
//!
//! The group channel binds a datagram socket on the well-known group port,
//! sends to the configured broadcast address, and receives everything on
//! that port (dropping the node's own transmissions). The unicast channel
//! accepts one ephemeral connection per private message; every outbound
//! private message is its own connect/write/close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use lanchat_proto::codec;
use lanchat_proto::envelope::{Envelope, MAX_DATAGRAM_SIZE};
use lanchat_proto::peer::PeerId;

use super::{DeliveryError, SocketSetupError, Transport};

/// Socket-level settings for a [`LanTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// The local node's identity (used to filter own broadcasts).
    pub self_id: PeerId,
    /// Address the unicast (TCP) listener binds to.
    pub listen_addr: SocketAddr,
    /// Address the group (UDP) socket binds to.
    pub group_bind: SocketAddr,
    /// Where group sends are addressed (broadcast address + group port).
    pub group_target: SocketAddr,
    /// Connect/write/read timeout for one private message.
    pub send_timeout: Duration,
    /// How long receive tasks get to wind down on shutdown.
    pub shutdown_grace: Duration,
    /// Inbound envelope queue capacity.
    pub channel_capacity: usize,
    /// Cap on concurrently serviced inbound connections.
    pub max_concurrent_accepts: usize,
}

/// UDP-plus-TCP transport bound to real sockets.
pub struct LanTransport {
    self_id: PeerId,
    udp: Arc<UdpSocket>,
    group_addr: SocketAddr,
    unicast_addr: SocketAddr,
    group_target: SocketAddr,
    send_timeout: Duration,
    shutdown_grace: Duration,
    inbound: tokio::sync::Mutex<mpsc::Receiver<(Envelope, SocketAddr)>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl LanTransport {
    /// Binds both channels and starts the receive tasks.
    ///
    /// # Errors
    ///
    /// Returns [`SocketSetupError`] if either socket cannot be bound —
    /// fatal at startup.
    pub async fn bind(config: TransportConfig) -> Result<Self, SocketSetupError> {
        let udp = UdpSocket::bind(config.group_bind)
            .await
            .map_err(|source| SocketSetupError::BindGroup {
                addr: config.group_bind,
                source,
            })?;
        udp.set_broadcast(true)
            .map_err(|source| SocketSetupError::BindGroup {
                addr: config.group_bind,
                source,
            })?;
        let group_addr = udp
            .local_addr()
            .map_err(|source| SocketSetupError::BindGroup {
                addr: config.group_bind,
                source,
            })?;

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| SocketSetupError::BindUnicast {
                addr: config.listen_addr,
                source,
            })?;
        let unicast_addr =
            listener
                .local_addr()
                .map_err(|source| SocketSetupError::BindUnicast {
                    addr: config.listen_addr,
                    source,
                })?;

        let udp = Arc::new(udp);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let group_task = tokio::spawn(group_recv_loop(
            Arc::clone(&udp),
            inbound_tx.clone(),
            config.self_id,
            shutdown_rx.clone(),
        ));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            inbound_tx,
            config.self_id,
            config.send_timeout,
            config.max_concurrent_accepts,
            config.shutdown_grace,
            shutdown_rx,
        ));

        tracing::info!(
            %group_addr,
            %unicast_addr,
            group_target = %config.group_target,
            "transport bound"
        );

        Ok(Self {
            self_id: config.self_id,
            udp,
            group_addr,
            unicast_addr,
            group_target: config.group_target,
            send_timeout: config.send_timeout,
            shutdown_grace: config.shutdown_grace,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            shutdown_tx,
            tasks: parking_lot::Mutex::new(vec![group_task, accept_task]),
        })
    }

    /// The bound address of the group (UDP) socket.
    #[must_use]
    pub const fn group_addr(&self) -> SocketAddr {
        self.group_addr
    }

    /// The bound address of the unicast (TCP) listener.
    #[must_use]
    pub const fn unicast_addr(&self) -> SocketAddr {
        self.unicast_addr
    }
}

impl Transport for LanTransport {
    async fn send_group(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let mut bytes = codec::encode(envelope)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            // Receivers read into a fixed buffer; anything past it is lost
            // on the wire anyway. The truncated payload will fail to decode
            // on the far side.
            tracing::warn!(
                len = bytes.len(),
                max = MAX_DATAGRAM_SIZE,
                "oversized group payload truncated at datagram boundary"
            );
            bytes.truncate(MAX_DATAGRAM_SIZE);
        }
        self.udp
            .send_to(&bytes, self.group_target)
            .await
            .map_err(DeliveryError::Broadcast)?;
        Ok(())
    }

    async fn send_private(
        &self,
        target: PeerId,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        let bytes = codec::encode(envelope)?;

        let stream = tokio::time::timeout(self.send_timeout, TcpStream::connect(target.addr()))
            .await
            .map_err(|_| DeliveryError::Timeout {
                peer: target,
                timeout: self.send_timeout,
            })?;
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(source) if source.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(DeliveryError::Unreachable(target));
            }
            Err(source) => return Err(DeliveryError::Io { peer: target, source }),
        };

        let write = async {
            stream.write_all(&bytes).await?;
            stream.shutdown().await
        };
        match tokio::time::timeout(self.send_timeout, write).await {
            Err(_) => Err(DeliveryError::Timeout {
                peer: target,
                timeout: self.send_timeout,
            }),
            Ok(Err(source)) => Err(DeliveryError::Io { peer: target, source }),
            Ok(Ok(())) => Ok(()),
        }
    }

    async fn recv(&self) -> Option<(Envelope, SocketAddr)> {
        self.inbound.lock().await.recv().await
    }

    async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(self.shutdown_grace, task).await.is_err() {
                tracing::debug!("receive task outlived the shutdown grace period");
            }
        }
        tracing::info!(self_id = %self.self_id, "transport stopped");
    }
}

/// Receives datagrams on the group port until shutdown.
///
/// Malformed datagrams are dropped and logged; the loop continues with the
/// next one. Own transmissions are filtered by the envelope's sender
/// identity.
async fn group_recv_loop(
    udp: Arc<UdpSocket>,
    inbound: mpsc::Sender<(Envelope, SocketAddr)>,
    self_id: PeerId,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, source) = tokio::select! {
            _ = shutdown.changed() => break,
            received = udp.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(error) => {
                    tracing::warn!(%error, "group socket receive failed");
                    continue;
                }
            },
        };
        match codec::decode(&buf[..len]) {
            Ok(envelope) if envelope.sender_id() == self_id => {
                tracing::trace!("dropping own broadcast");
            }
            Ok(envelope) => {
                if inbound.send((envelope, source)).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::warn!(%source, %error, "dropping malformed datagram");
            }
        }
    }
    tracing::debug!("group receive loop stopped");
}

/// Accepts unicast connections until shutdown, one short-lived reader task
/// per connection, capped to avoid unbounded task growth under a flood.
///
/// Readers are tracked in a [`JoinSet`]: on shutdown, in-flight connections
/// get the grace period to finish and are then aborted, so no reader
/// outlives this loop or enqueues envelopes after it returns.
async fn accept_loop(
    listener: TcpListener,
    inbound: mpsc::Sender<(Envelope, SocketAddr)>,
    self_id: PeerId,
    read_timeout: Duration,
    max_concurrent: usize,
    shutdown_grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let limiter = Arc::new(Semaphore::new(max_concurrent));
    let mut readers = JoinSet::new();
    loop {
        let (stream, source) = tokio::select! {
            _ = shutdown.changed() => break,
            // Reap finished readers so the set does not grow unbounded.
            Some(_) = readers.join_next(), if !readers.is_empty() => continue,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(error) => {
                    tracing::warn!(%error, "accept failed");
                    continue;
                }
            },
        };
        let Ok(permit) = Arc::clone(&limiter).try_acquire_owned() else {
            tracing::warn!(%source, "connection flood, dropping inbound connection");
            continue;
        };
        let inbound = inbound.clone();
        readers.spawn(async move {
            let _permit = permit;
            read_one(stream, source, self_id, read_timeout, inbound).await;
        });
    }

    let drain = async {
        while readers.join_next().await.is_some() {}
    };
    if tokio::time::timeout(shutdown_grace, drain).await.is_err() {
        tracing::debug!(
            remaining = readers.len(),
            "aborting readers past the shutdown grace period"
        );
        readers.shutdown().await;
    }
    tracing::debug!("accept loop stopped");
}

/// Reads exactly one envelope from an accepted connection, dispatches it,
/// and lets the connection close.
async fn read_one(
    stream: TcpStream,
    source: SocketAddr,
    self_id: PeerId,
    read_timeout: Duration,
    inbound: mpsc::Sender<(Envelope, SocketAddr)>,
) {
    let mut buf = Vec::with_capacity(MAX_DATAGRAM_SIZE);
    let mut limited = stream.take(MAX_DATAGRAM_SIZE as u64 + 1);
    match tokio::time::timeout(read_timeout, limited.read_to_end(&mut buf)).await {
        Err(_) => {
            tracing::warn!(%source, "inbound connection read timed out");
        }
        Ok(Err(error)) => {
            tracing::warn!(%source, %error, "inbound connection read failed");
        }
        Ok(Ok(_)) if buf.len() > MAX_DATAGRAM_SIZE => {
            tracing::warn!(%source, len = buf.len(), "oversized private payload dropped");
        }
        Ok(Ok(_)) => match codec::decode(&buf) {
            Ok(envelope) if envelope.sender_id() == self_id => {
                tracing::trace!(%source, "dropping own unicast envelope");
            }
            Ok(envelope) => {
                let _ = inbound.send((envelope, source)).await;
            }
            Err(error) => {
                tracing::warn!(%source, %error, "dropping malformed private payload");
            }
        },
    }
}
