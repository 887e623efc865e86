//! Property-based wire codec tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `Envelope` survives encode → decode round-trip.
//! 2. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 3. Encoded envelopes are always valid UTF-8.
//!
//! Verification command: `cargo test --test envelope_roundtrip`

use proptest::prelude::*;

use lanchat_proto::codec;
use lanchat_proto::envelope::Envelope;
use lanchat_proto::peer::{PeerId, Timestamp};

// --- Strategies for protocol types ---

/// Strategy for arbitrary `PeerId` values (IPv4 and IPv6 identities).
fn arb_peer_id() -> impl Strategy<Value = PeerId> {
    let v4 = (any::<[u8; 4]>(), any::<u16>()).prop_map(|(octets, port)| {
        PeerId::from_parts(std::net::IpAddr::V4(octets.into()), port)
    });
    let v6 = (any::<[u8; 16]>(), any::<u16>()).prop_map(|(octets, port)| {
        PeerId::from_parts(std::net::IpAddr::V6(octets.into()), port)
    });
    prop_oneof![v4, v6]
}

/// Strategy for arbitrary `Timestamp` values.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

/// Strategy for message content: printable, bounded text (control
/// characters excluded to keep generated cases readable in failure output).
fn arb_content() -> impl Strategy<Value = String> {
    "[^\x00-\x1f]{0,256}"
}

/// Strategy for group channel names.
fn arb_group_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,31}"
}

/// Strategy for arbitrary envelopes across all three variants.
fn arb_envelope() -> impl Strategy<Value = Envelope> {
    prop_oneof![
        (arb_peer_id(), arb_timestamp()).prop_map(|(sender_id, timestamp)| {
            Envelope::Presence {
                sender_id,
                timestamp,
            }
        }),
        (arb_peer_id(), arb_timestamp(), arb_group_name(), arb_content()).prop_map(
            |(sender_id, timestamp, conversation_name, content)| Envelope::GroupMessage {
                sender_id,
                timestamp,
                conversation_name,
                content,
            }
        ),
        (arb_peer_id(), arb_timestamp(), arb_peer_id(), arb_content()).prop_map(
            |(sender_id, timestamp, target_id, content)| Envelope::PrivateMessage {
                sender_id,
                timestamp,
                target_id,
                content,
            }
        ),
    ]
}

proptest! {
    #[test]
    fn envelope_roundtrips(envelope in arb_envelope()) {
        let bytes = codec::encode(&envelope).expect("encode");
        let decoded = codec::decode(&bytes).expect("decode");
        prop_assert_eq!(envelope, decoded);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..1024)) {
        // Either outcome is fine; the property is "no panic".
        let _ = codec::decode(&bytes);
    }

    #[test]
    fn encoded_envelopes_are_utf8(envelope in arb_envelope()) {
        let bytes = codec::encode(&envelope).expect("encode");
        prop_assert!(std::str::from_utf8(&bytes).is_ok());
    }
}
