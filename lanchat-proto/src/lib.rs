//! Shared protocol definitions for the `LanChat` wire format.

pub mod codec;
pub mod envelope;
pub mod peer;
