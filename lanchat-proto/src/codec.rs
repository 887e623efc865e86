//! Serialization and deserialization for the `LanChat` wire protocol.
//!
//! The wire format is UTF-8 JSON, one envelope per datagram or connection.
//! Decoding arbitrary bytes must never panic: malformed input yields a
//! [`DecodeError`] so the receive loop can drop the datagram and continue.

use crate::envelope::Envelope;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The bytes are not a well-formed envelope (bad UTF-8, truncated JSON,
    /// unknown type tag, missing fields).
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Serializing an envelope failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Encodes an [`Envelope`] into UTF-8 JSON bytes.
///
/// # Errors
///
/// Returns [`DecodeError::Encode`] if the envelope cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, DecodeError> {
    serde_json::to_vec(envelope).map_err(|e| DecodeError::Encode(e.to_string()))
}

/// Decodes an [`Envelope`] from raw bytes.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the bytes are not a valid envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
}
