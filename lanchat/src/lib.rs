//! `LanChat` — serverless LAN chat node library.

pub mod config;
pub mod history;
pub mod node;
pub mod peers;
pub mod presence;
pub mod router;
pub mod transport;
