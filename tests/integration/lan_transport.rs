//! Real-socket transport tests on the loopback interface.
//!
//! Each test binds its own ephemeral ports. Group-channel tests point two
//! transports at each other's bound UDP port, which exercises the datagram
//! path without needing an actual broadcast-capable network.
//!
//! Verification command: `cargo test --test lan_transport`

use std::net::SocketAddr;
use std::time::Duration;

use lanchat::transport::lan::{LanTransport, TransportConfig};
use lanchat::transport::{DeliveryError, Transport};
use lanchat_proto::codec;
use lanchat_proto::envelope::Envelope;
use lanchat_proto::peer::{PeerId, Timestamp};

// =============================================================================
// Test helpers
// =============================================================================

fn localhost_any() -> SocketAddr {
    "127.0.0.1:0".parse().expect("addr")
}

/// Reserves a free UDP port by binding and immediately dropping a socket.
fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind probe");
    socket.local_addr().expect("local addr").port()
}

/// Reserves a free TCP port the same way. The listener is dropped, so
/// connecting to this port is refused.
fn free_tcp_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    listener.local_addr().expect("local addr").port()
}

fn config(id: &str, group_bind: SocketAddr, group_target: SocketAddr) -> TransportConfig {
    TransportConfig {
        self_id: id.parse().expect("peer id"),
        listen_addr: localhost_any(),
        group_bind,
        group_target,
        send_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_millis(500),
        channel_capacity: 32,
        max_concurrent_accepts: 8,
    }
}

/// Binds two transports whose group channels are aimed at each other.
async fn udp_pair(a_id: &str, b_id: &str) -> (LanTransport, LanTransport) {
    let port_a = free_udp_port();
    let port_b = free_udp_port();
    let addr_a: SocketAddr = format!("127.0.0.1:{port_a}").parse().expect("addr");
    let addr_b: SocketAddr = format!("127.0.0.1:{port_b}").parse().expect("addr");

    let a = LanTransport::bind(config(a_id, addr_a, addr_b))
        .await
        .expect("bind a");
    let b = LanTransport::bind(config(b_id, addr_b, addr_a))
        .await
        .expect("bind b");
    (a, b)
}

async fn recv_one(transport: &LanTransport) -> (Envelope, SocketAddr) {
    tokio::time::timeout(Duration::from_secs(2), transport.recv())
        .await
        .expect("timed out waiting for an envelope")
        .expect("transport closed")
}

// =============================================================================
// Group channel (UDP)
// =============================================================================

#[tokio::test]
async fn group_send_crosses_the_wire() {
    let (alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;

    let sent = Envelope::GroupMessage {
        sender_id: "10.0.0.1:8888".parse().expect("peer id"),
        timestamp: Timestamp::from_millis(42),
        conversation_name: "general".to_string(),
        content: "over real sockets".to_string(),
    };
    alice.send_group(&sent).await.expect("send");

    let (received, source) = recv_one(&bob).await;
    assert_eq!(received, sent);
    assert!(source.ip().is_loopback());
}

#[tokio::test]
async fn own_broadcast_is_dropped_on_receive() {
    // One transport aimed at its own group port hears its own datagrams at
    // the socket level but must filter them by sender identity.
    let port = free_udp_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().expect("addr");
    let solo = LanTransport::bind(config("10.0.0.1:8888", addr, addr))
        .await
        .expect("bind");

    solo.send_group(&Envelope::presence("10.0.0.1:8888".parse().expect("peer id")))
        .await
        .expect("send");

    let outcome = tokio::time::timeout(Duration::from_millis(300), solo.recv()).await;
    assert!(outcome.is_err(), "own broadcast leaked through: {outcome:?}");
}

#[tokio::test]
async fn malformed_datagram_does_not_stall_the_receive_loop() {
    let port = free_udp_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().expect("addr");
    let receiver = LanTransport::bind(config("10.0.0.1:8888", addr, addr))
        .await
        .expect("bind");

    let raw = std::net::UdpSocket::bind("127.0.0.1:0").expect("raw socket");
    raw.send_to(b"{not json", receiver.group_addr())
        .expect("send garbage");

    // The next valid envelope still comes through.
    let valid = Envelope::presence("10.0.0.2:8888".parse().expect("peer id"));
    let bytes = codec::encode(&valid).expect("encode");
    raw.send_to(&bytes, receiver.group_addr()).expect("send valid");

    let (received, _) = recv_one(&receiver).await;
    assert_eq!(received, valid);
}

// =============================================================================
// Unicast channel (TCP)
// =============================================================================

#[tokio::test]
async fn private_message_is_delivered_over_tcp() {
    let (alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;

    // Address Bob by his actual TCP listener, as a peer table would after
    // discovery.
    let bob_id = PeerId::new(bob.unicast_addr());
    let sent = Envelope::PrivateMessage {
        sender_id: "10.0.0.1:8888".parse().expect("peer id"),
        timestamp: Timestamp::from_millis(7),
        target_id: bob_id,
        content: "direct line".to_string(),
    };
    alice.send_private(bob_id, &sent).await.expect("send");

    let (received, _) = recv_one(&bob).await;
    assert_eq!(received, sent);
}

#[tokio::test]
async fn each_private_message_uses_its_own_connection() {
    let (alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;
    let bob_id = PeerId::new(bob.unicast_addr());

    for n in 0..3u64 {
        let envelope = Envelope::PrivateMessage {
            sender_id: "10.0.0.1:8888".parse().expect("peer id"),
            timestamp: Timestamp::from_millis(n),
            target_id: bob_id,
            content: format!("message {n}"),
        };
        alice.send_private(bob_id, &envelope).await.expect("send");
        let (received, _) = recv_one(&bob).await;
        assert_eq!(received, envelope);
    }
}

#[tokio::test]
async fn refused_connection_maps_to_unreachable() {
    let (alice, _bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;

    let dead_port = free_tcp_port();
    let gone: PeerId = format!("127.0.0.1:{dead_port}").parse().expect("peer id");
    let envelope = Envelope::PrivateMessage {
        sender_id: "10.0.0.1:8888".parse().expect("peer id"),
        timestamp: Timestamp::from_millis(1),
        target_id: gone,
        content: "anyone there?".to_string(),
    };

    let err = alice.send_private(gone, &envelope).await.unwrap_err();
    assert!(
        matches!(err, DeliveryError::Unreachable(p) if p == gone),
        "expected unreachable, got {err:?}"
    );
}

#[tokio::test]
async fn oversized_private_payload_is_dropped_by_the_receiver() {
    let (alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;
    let bob_id = PeerId::new(bob.unicast_addr());

    let big = Envelope::PrivateMessage {
        sender_id: "10.0.0.1:8888".parse().expect("peer id"),
        timestamp: Timestamp::from_millis(1),
        target_id: bob_id,
        content: "x".repeat(4096),
    };
    // The receiver stops reading at its size cap, which may reset the
    // sender's connection mid-write; either way nothing is dispatched.
    let _ = alice.send_private(bob_id, &big).await;

    let outcome = tokio::time::timeout(Duration::from_millis(300), bob.recv()).await;
    assert!(outcome.is_err(), "oversized payload leaked through: {outcome:?}");
}

#[tokio::test]
async fn oversized_group_payload_is_dropped_after_truncation() {
    let (alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;

    let big = Envelope::GroupMessage {
        sender_id: "10.0.0.1:8888".parse().expect("peer id"),
        timestamp: Timestamp::from_millis(1),
        conversation_name: "general".to_string(),
        content: "x".repeat(4096),
    };
    // Truncated at the datagram cap on send; the receiver cannot decode
    // the cut-off payload and drops it.
    alice.send_group(&big).await.expect("send");

    let outcome = tokio::time::timeout(Duration::from_millis(300), bob.recv()).await;
    assert!(outcome.is_err(), "truncated payload leaked through: {outcome:?}");

    // The group channel keeps working afterwards.
    let valid = Envelope::presence("10.0.0.1:8888".parse().expect("peer id"));
    alice.send_group(&valid).await.expect("send");
    let (received, _) = recv_one(&bob).await;
    assert_eq!(received, valid);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn shutdown_cuts_off_in_flight_connections() {
    use tokio::io::AsyncWriteExt;

    let (_alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;

    // Open a connection but send nothing, parking a reader task on it.
    let mut stalled = tokio::net::TcpStream::connect(bob.unicast_addr())
        .await
        .expect("connect");

    // The reader outwaits the grace period and is aborted; shutdown still
    // completes.
    bob.shutdown().await;

    // Data arriving on the old connection can no longer be dispatched:
    // every sender is gone, so the stream ends instead of yielding a fresh
    // envelope.
    let late = Envelope::presence("10.0.0.1:8888".parse().expect("peer id"));
    let bytes = codec::encode(&late).expect("encode");
    let _ = stalled.write_all(&bytes).await;
    let _ = stalled.shutdown().await;

    let outcome = tokio::time::timeout(Duration::from_secs(1), bob.recv()).await;
    assert_eq!(outcome.expect("recv should resolve after shutdown"), None);
}

#[tokio::test]
async fn shutdown_ends_the_receive_stream() {
    let (alice, bob) = udp_pair("10.0.0.1:8888", "10.0.0.2:8888").await;

    bob.shutdown().await;
    let outcome = tokio::time::timeout(Duration::from_secs(1), bob.recv()).await;
    assert_eq!(outcome.expect("recv should resolve after shutdown"), None);

    // The peer's side keeps working.
    alice
        .send_group(&Envelope::presence("10.0.0.1:8888".parse().expect("peer id")))
        .await
        .expect("send after peer shutdown");
}
